mod layout;
mod machine;
mod package_store;
mod state_store;

pub use layout::UpdateLayout;
pub use machine::StateMachine;
pub use package_store::PackageStore;
pub use state_store::{StateStore, StoreError};

#[cfg(test)]
mod tests;
