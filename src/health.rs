//! Backend health aggregation.
//!
//! Probes every backend concurrently and folds the results into one status.
//! Probing never fails: an unreachable backend is simply reported as down.

use chrono::Utc;
use serde::Serialize;

use crate::config::ConfigSummary;
use crate::orchestrator::Backends;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    /// Every backend is up.
    Ok,
    /// At least one retrieval backend is up.
    Degraded,
    /// Neither retrieval backend is up.
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ServiceStatus {
    pub rag: bool,
    pub sqlite: bool,
    /// `false` when the SRD API is disabled.
    pub srd: bool,
    pub llm: bool,
}

impl ServiceStatus {
    pub fn overall(&self) -> OverallStatus {
        if self.rag && self.sqlite && self.srd && self.llm {
            OverallStatus::Ok
        } else if self.rag || self.sqlite {
            OverallStatus::Degraded
        } else {
            OverallStatus::Error
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: OverallStatus,
    pub services: ServiceStatus,
    pub config: ConfigSummary,
    /// Seconds since the process started.
    pub uptime: u64,
    pub timestamp: String,
}

pub async fn probe_all(backends: &Backends) -> ServiceStatus {
    let srd = async {
        match &backends.reference {
            Some(reference) => reference.healthy().await,
            None => false,
        }
    };

    let (rag, sqlite, srd, llm) = tokio::join!(
        backends.search.healthy(),
        backends.structured.healthy(),
        srd,
        backends.llm.healthy(),
    );

    ServiceStatus {
        rag,
        sqlite,
        srd,
        llm,
    }
}

pub async fn report(backends: &Backends, config: ConfigSummary, uptime: u64) -> HealthReport {
    let services = probe_all(backends).await;
    let status = services.overall();
    if status != OverallStatus::Ok {
        tracing::warn!(?services, "backend health check reported failures");
    }
    HealthReport {
        status,
        services,
        config,
        uptime,
        timestamp: Utc::now().to_rfc3339(),
    }
}
