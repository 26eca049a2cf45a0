pub mod http;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::ServiceError;
use crate::models::{BaselineMetrics, DeviceStatus};

pub use http::HttpStatusService;

/// Remote service that knows whether a device finished onboarding
#[async_trait]
pub trait StatusService: Send + Sync {
    async fn check_device(&self, device_id: &str) -> Result<DeviceStatus, ServiceError>;
}

/// Baseline fields as they appear in a status response; any may be missing
#[derive(Debug, Default, Deserialize)]
struct MetricsDocument {
    mean_hr: Option<f64>,
    sdnn: Option<f64>,
    rmssd: Option<f64>,
    pnn50: Option<f64>,
    lf_hf_ratio: Option<f64>,
    sd1_sd2_ratio: Option<f64>,
}

impl MetricsDocument {
    fn is_empty(&self) -> bool {
        [
            self.mean_hr,
            self.sdnn,
            self.rmssd,
            self.pnn50,
            self.lf_hf_ratio,
            self.sd1_sd2_ratio,
        ]
        .iter()
        .all(Option::is_none)
    }

    fn into_metrics(self) -> BaselineMetrics {
        BaselineMetrics {
            mean_hr: self.mean_hr.unwrap_or_default(),
            sdnn: self.sdnn.unwrap_or_default(),
            rmssd: self.rmssd.unwrap_or_default(),
            pnn50: self.pnn50.unwrap_or_default(),
            lf_hf_ratio: self.lf_hf_ratio.unwrap_or_default(),
            sd1_sd2_ratio: self.sd1_sd2_ratio.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct StatusDocument {
    onboarded: bool,
    #[serde(default)]
    baseline_metrics: Option<MetricsDocument>,
    #[serde(flatten)]
    inline: MetricsDocument,
}

impl DeviceStatus {
    /// Parse a status response body
    ///
    /// Baseline fields are read from the nested `baseline_metrics` object, or
    /// from the top level when that object is absent. Missing fields are zero.
    pub fn from_json(body: &str) -> Result<DeviceStatus, ServiceError> {
        let doc: StatusDocument = serde_json::from_str(body)?;

        let metrics = match doc.baseline_metrics {
            Some(nested) if !nested.is_empty() => nested,
            _ => doc.inline,
        };

        let baseline = if doc.onboarded && !metrics.is_empty() {
            Some(metrics.into_metrics())
        } else {
            None
        };

        Ok(DeviceStatus {
            onboarded: doc.onboarded,
            baseline,
        })
    }
}
