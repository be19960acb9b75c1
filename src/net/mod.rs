pub mod fetch;
pub mod classifier;

pub use classifier::{Classifier, ClassifierVerdict, HttpClassifier, PredictRequest};
pub use fetch::{fetch_url, FetchResult};
