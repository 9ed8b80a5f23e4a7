//! Extraction Orchestrator: runs every processing unit concurrently,
//! relays progress to the session stream, and settles an aggregate.
//!
//! Units are independent — one unit failing or timing out never touches
//! another. The run settles when every unit has reached a terminal state;
//! a run with at least one completed unit is a success.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use uuid::Uuid;

use crate::config;
use crate::error::OnboardingError;
use crate::events::{Event, EventBroadcaster};
use crate::models::{FileKind, PortfolioItem, ProcessingUnit, UnitStatus};

use super::service::{DocumentCollaborator, DocumentMessage, TabularCollaborator};

/// Aggregate outcome of one extraction run.
#[derive(Debug)]
pub struct ExtractionReport {
    /// Every unit in its terminal state, input order preserved.
    pub units: Vec<ProcessingUnit>,
    /// Portfolio items from all tabular units, input order preserved.
    pub portfolio_items: Vec<PortfolioItem>,
    pub completed: usize,
    pub failed: usize,
    /// `round(100 * completed / total)`.
    pub overall_progress: u8,
}

impl ExtractionReport {
    /// Partial success is success: true when at least one unit completed.
    pub fn succeeded(&self) -> bool {
        self.completed > 0
    }

    /// Portfolio items plus streamed fund records across all units.
    pub fn record_count(&self) -> usize {
        self.portfolio_items.len() + self.units.iter().map(|u| u.records.len()).sum::<usize>()
    }

    /// Fund records from document units, flattened in unit order.
    pub fn extractions(&self) -> impl Iterator<Item = &crate::models::FundExtraction> {
        self.units.iter().flat_map(|u| u.records.iter())
    }
}

pub struct ExtractionOrchestrator {
    tabular: Arc<dyn TabularCollaborator>,
    document: Arc<dyn DocumentCollaborator>,
    broadcaster: Arc<EventBroadcaster>,
    /// Max silence tolerated per unit before it is timed out and cancelled.
    silence_ceiling: Duration,
}

impl ExtractionOrchestrator {
    pub fn new(
        tabular: Arc<dyn TabularCollaborator>,
        document: Arc<dyn DocumentCollaborator>,
        broadcaster: Arc<EventBroadcaster>,
    ) -> Self {
        Self {
            tabular,
            document,
            broadcaster,
            silence_ceiling: config::EXTRACTION_SILENCE_CEILING,
        }
    }

    /// Shrink the silence ceiling. Tests use this to exercise the timeout
    /// path without waiting out the production value.
    pub fn with_silence_ceiling(mut self, ceiling: Duration) -> Self {
        self.silence_ceiling = ceiling;
        self
    }

    /// Run every unit to a terminal state and publish the aggregate.
    pub async fn run(&self, session_id: Uuid, units: Vec<ProcessingUnit>) -> ExtractionReport {
        let total = units.len();
        tracing::info!(%session_id, units = total, "Extraction run starting");

        let settled = join_all(
            units
                .into_iter()
                .map(|unit| self.run_unit(session_id, unit)),
        )
        .await;

        let mut units = Vec::with_capacity(total);
        let mut portfolio_items = Vec::new();
        for (unit, items) in settled {
            portfolio_items.extend(items);
            units.push(unit);
        }

        let completed = units
            .iter()
            .filter(|u| u.status == UnitStatus::Completed)
            .count();
        let failed = units
            .iter()
            .filter(|u| u.status == UnitStatus::Error)
            .count();
        let overall_progress = if total == 0 {
            100
        } else {
            ((100.0 * completed as f64 / total as f64).round()) as u8
        };

        let report = ExtractionReport {
            units,
            portfolio_items,
            completed,
            failed,
            overall_progress,
        };

        self.broadcaster.publish(
            session_id,
            Event::AnalysisComplete {
                total_units: total,
                completed,
                failed,
                record_count: report.record_count(),
            },
        );
        tracing::info!(
            %session_id,
            completed,
            failed,
            records = report.record_count(),
            "Extraction run settled"
        );
        report
    }

    /// Drive one unit to a terminal state. Never returns early — every
    /// failure mode lands in the unit's own error descriptor.
    async fn run_unit(
        &self,
        session_id: Uuid,
        mut unit: ProcessingUnit,
    ) -> (ProcessingUnit, Vec<PortfolioItem>) {
        unit.start();
        self.publish_status(session_id, &unit);

        let items = match unit.kind {
            FileKind::Tabular => self.run_tabular(session_id, &mut unit).await,
            FileKind::Document => {
                self.run_document(session_id, &mut unit).await;
                Vec::new()
            }
        };

        if unit.status == UnitStatus::Error {
            if let Some(error) = &unit.error {
                self.broadcaster.publish(
                    session_id,
                    Event::Error {
                        kind: error.kind.clone(),
                        detail: format!("{}: {}", unit.file_name, error.detail),
                    },
                );
            }
        }
        (unit, items)
    }

    async fn run_tabular(&self, session_id: Uuid, unit: &mut ProcessingUnit) -> Vec<PortfolioItem> {
        let path = Path::new(&unit.file_path);
        let call = self.tabular.extract_portfolio(path);
        match tokio::time::timeout(self.silence_ceiling, call).await {
            Ok(Ok(items)) => {
                unit.complete(format!("Parsed {} holdings", items.len()));
                self.publish_status(session_id, unit);
                self.broadcaster.publish(
                    session_id,
                    Event::PortfolioProcessed {
                        file: unit.file_name.clone(),
                        item_count: items.len(),
                    },
                );
                items
            }
            Ok(Err(e)) => {
                unit.fail(e.kind(), e.to_string());
                Vec::new()
            }
            Err(_) => {
                let e = OnboardingError::Timeout(self.silence_ceiling.as_secs());
                unit.fail(e.kind(), e.to_string());
                Vec::new()
            }
        }
    }

    async fn run_document(&self, session_id: Uuid, unit: &mut ProcessingUnit) {
        let path = Path::new(&unit.file_path);
        let mut rx = match self.document.extract_document(path).await {
            Ok(rx) => rx,
            Err(e) => {
                unit.fail(e.kind(), e.to_string());
                return;
            }
        };

        loop {
            // The ceiling bounds silence between messages, not total
            // runtime. Dropping the receiver cancels the extraction.
            let message = match tokio::time::timeout(self.silence_ceiling, rx.recv()).await {
                Ok(Some(message)) => message,
                Ok(None) => {
                    let e = OnboardingError::StreamInterrupted(
                        "extraction stream ended without completing".to_string(),
                    );
                    unit.fail(e.kind(), e.to_string());
                    return;
                }
                Err(_) => {
                    drop(rx);
                    let e = OnboardingError::Timeout(self.silence_ceiling.as_secs());
                    unit.fail(e.kind(), e.to_string());
                    return;
                }
            };

            match message {
                DocumentMessage::Progress { progress, message } => {
                    if unit.advance_progress(progress, message) {
                        self.publish_status(session_id, unit);
                    }
                }
                DocumentMessage::Record { extraction } => {
                    unit.records.push(extraction.clone());
                    self.broadcaster
                        .publish(session_id, Event::FundExtracted { extraction });
                }
                DocumentMessage::Done { record_count } => {
                    unit.complete(format!("Extracted {record_count} fund records"));
                    self.publish_status(session_id, unit);
                    return;
                }
                DocumentMessage::Error { detail } => {
                    let e = OnboardingError::ExtractionServiceError(detail);
                    unit.fail(e.kind(), e.to_string());
                    return;
                }
            }
        }
    }

    fn publish_status(&self, session_id: Uuid, unit: &ProcessingUnit) {
        self.broadcaster.publish(
            session_id,
            Event::Status {
                file: unit.file_name.clone(),
                progress: unit.progress,
                message: unit.message.clone(),
            },
        );
    }
}
