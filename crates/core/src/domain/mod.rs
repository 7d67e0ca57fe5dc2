pub mod contract;
pub mod portfolio;
pub mod recommendation;
pub mod test_result;
