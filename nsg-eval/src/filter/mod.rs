//! Rule evaluation logic

pub mod evaluator;
pub mod layers;
pub mod matcher;
pub mod validator;

pub use evaluator::{evaluate, Reachability, ReachabilityVerdict};
pub use layers::{evaluate_layers, LayerVerdict, LayeredVerdict, NsgLayer, NsgScope};
pub use matcher::RuleMatcher;
pub use validator::RuleSetValidator;
