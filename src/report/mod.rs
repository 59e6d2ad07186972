pub mod models;
pub mod service;

pub use models::{BrightnessReport, BrightnessUpdate, ReportError, ReportResult};
pub use service::{BrightnessClient, BrightnessSink, RemoteStateReporter};
