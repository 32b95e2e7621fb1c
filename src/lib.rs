pub mod analyzer;
pub mod error;
pub mod loader;
pub mod models;
pub mod normalize;
pub mod pacing;
pub mod parser;
pub mod report;
pub mod schema;

pub use analyzer::{
    classify, AnalysisReport, BookingCurve, ClassificationPolicy, PacingAnalyzer, PastFlightPolicy,
};
pub use error::PacingError;
pub use models::{ClassifiedFlight, Config, DropReason, FlightRecord, FlightStatus};
