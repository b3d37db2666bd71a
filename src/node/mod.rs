pub mod admission;
pub mod constants;
pub mod events;
pub mod mutator;
pub mod reconcile;
pub mod selectors;
pub mod store;

#[cfg(test)]
pub mod test_support;
