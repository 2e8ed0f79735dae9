//! Field extraction
//!
//! Evaluates every declared field against every document and hands the resulting
//! observations to the publisher. Counter fields are turned into deltas here.
//!
//! All observations of a document are computed before the first one is sent, so a
//! failing field never leaves part of a document published.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::document::{Document, QueryError};
use crate::source::{DocumentSource, SourceError};
use crate::spec::Spec;

/// One extracted value, tagged with its field id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    pub id: String,
    pub value: f64,
    pub is_counter: bool,
}

/// Errors that end a run
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("input error")]
    Source(#[from] SourceError),
    #[error("cannot get {field}")]
    Field {
        field: String,
        #[source]
        source: QueryError,
    },
}

/// Applies specs to documents and keeps the previous raw reading of each counter
pub struct Extractor {
    specs: Vec<Spec>,
    counters: HashMap<String, f64>,
}

impl Extractor {
    pub fn new(specs: Vec<Spec>) -> Self {
        Self {
            specs,
            counters: HashMap::new(),
        }
    }

    /// Observations for one document, in declared field order
    ///
    /// The first reading of a counter field yields a zero delta.
    pub fn extract(&mut self, doc: &Document) -> Result<Vec<Observation>, ExtractError> {
        let readings = self
            .specs
            .iter()
            .flat_map(|spec| spec.fields.iter())
            .map(|field| {
                doc.number(&field.path)
                    .map(|raw| (field, raw))
                    .map_err(|source| ExtractError::Field {
                        field: field.id.clone(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut observations = Vec::with_capacity(readings.len());
        for (field, raw) in readings {
            let value = if field.is_counter {
                let previous = self.counters.insert(field.id.clone(), raw);
                previous.map_or(0.0, |previous| raw - previous)
            } else {
                raw
            };
            observations.push(Observation {
                id: field.id.clone(),
                value,
                is_counter: field.is_counter,
            });
        }

        Ok(observations)
    }

    /// Pull documents from `source` until it ends, sending observations to `target`
    ///
    /// Returns the number of documents processed. A dropped receiver ends the run
    /// cleanly and closes the source.
    pub async fn run<S: DocumentSource>(
        &mut self,
        source: &mut S,
        target: mpsc::Sender<Observation>,
    ) -> Result<u64, ExtractError> {
        let mut documents = 0;

        while let Some(doc) = source.next().await? {
            let observations = self.extract(&doc)?;
            for observation in observations {
                if target.send(observation).await.is_err() {
                    debug!("publisher went away after {} documents", documents);
                    source.close();
                    return Ok(documents);
                }
            }
            documents += 1;
        }

        info!("Input ended after {} documents", documents);
        source.close();
        Ok(documents)
    }
}
