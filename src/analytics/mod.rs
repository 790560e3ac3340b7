//! Analytics module for trend analysis and anomaly detection

pub mod trends;

pub use trends::{
    default_slope_thresholds, detect_anomalies, least_squares_slope, TrendAnalysis,
    TrendAnalyzer, TrendDirection, TrendError, TrendMetric, TrendResult,
};
