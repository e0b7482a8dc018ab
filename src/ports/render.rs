use std::sync::Arc;

use time::OffsetDateTime;

use crate::types::schedule::DayGrid;
use crate::types::subscriber::DisplayMode;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub name: String,
    pub content_type: &'static str,
    pub bytes: Arc<[u8]>,
}

#[derive(Debug, Clone)]
pub struct ChartRequest {
    pub queue_label: String,
    pub mode: DisplayMode,
    pub today: DayGrid,
    /// `None` hides the tomorrow view (nothing published yet).
    pub tomorrow: Option<DayGrid>,
    /// Current instant for views that draw a time marker.
    pub marker: Option<OffsetDateTime>,
    pub emergency: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("failed to encode chart: {0}")]
    Encode(String),
}

pub trait ChartRenderer: Clone + Send + Sync + 'static {
    fn render(&self, request: &ChartRequest) -> Result<Vec<Artifact>, RenderError>;
}
