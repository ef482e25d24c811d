mod applications;

pub use applications::SurrealApplicationStore;
