use crate::types::MetricSelection;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChoroplethError {
    #[error("no neighborhood aggregates to compute {metric} bounds from")]
    EmptyDataset { metric: MetricSelection },

    #[error("no aggregate scores for neighborhood {name:?}")]
    UnknownNeighborhood { name: String },

    #[error("{metric} score for neighborhood {name:?} is not a finite number")]
    NonFiniteScore { name: String, metric: MetricSelection },

    #[error("unknown metric {0:?}, expected \"inspections\" or \"violations\"")]
    UnknownMetric(String),

    #[error("invalid colour {0:?}, expected #rrggbb")]
    InvalidColor(String),

    #[error("colour palette must contain at least one colour")]
    EmptyPalette,

    #[error("unrecognised inspection date {0:?}")]
    InvalidDate(String),
}

pub type ChoroplethResult<T> = Result<T, ChoroplethError>;
