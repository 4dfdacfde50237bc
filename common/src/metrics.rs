use serde::{Deserialize, Serialize};

/// Resumen agregable de métricas para un rango de registros.
///
/// Sólo guarda contadores; el promedio se calcula al leer
/// (`average_response_time`) para que dos resúmenes se puedan combinar
/// sumando campo a campo, en cualquier orden.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub error_count: u64,
    /// En el wire se llama `total_response_time`.
    #[serde(rename = "total_response_time", alias = "response_time_total")]
    pub response_time_total: u64,
    pub response_count: u64,
}

impl MetricsSummary {
    /// Resumen neutro: `merge(identity(), x) == x`.
    pub fn identity() -> Self {
        Self::default()
    }

    /// Suma campo a campo. Asociativa y conmutativa.
    pub fn merge(self, other: MetricsSummary) -> MetricsSummary {
        MetricsSummary {
            error_count: self.error_count.saturating_add(other.error_count),
            response_time_total: self
                .response_time_total
                .saturating_add(other.response_time_total),
            response_count: self.response_count.saturating_add(other.response_count),
        }
    }

    /// 0 cuando no hubo ninguna medición.
    pub fn average_response_time(&self) -> f64 {
        if self.response_count == 0 {
            0.0
        } else {
            self.response_time_total as f64 / self.response_count as f64
        }
    }

    pub fn record_error(&mut self) {
        self.error_count += 1;
    }

    pub fn record_response_time(&mut self, millis: u64) {
        self.response_time_total = self.response_time_total.saturating_add(millis);
        self.response_count += 1;
    }
}

/// Lo que responde un worker en `POST /work`: el resumen más el promedio derivado.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsReport {
    #[serde(flatten)]
    pub summary: MetricsSummary,
    #[serde(default)]
    pub average_response_time: f64,
}

impl From<MetricsSummary> for MetricsReport {
    fn from(summary: MetricsSummary) -> Self {
        Self {
            average_response_time: summary.average_response_time(),
            summary,
        }
    }
}

/// Fold de una secuencia de resúmenes.
pub fn merge_all<I>(summaries: I) -> MetricsSummary
where
    I: IntoIterator<Item = MetricsSummary>,
{
    summaries
        .into_iter()
        .fold(MetricsSummary::identity(), MetricsSummary::merge)
}
