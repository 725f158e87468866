pub mod classifier;
pub mod report;

pub use classifier::LoanClassifier;
pub use report::{ClassBreakdown, ClassificationReportAggregator, PortfolioAtRisk};
