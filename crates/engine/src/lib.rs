#![doc = include_str!("../README.md")]

pub mod builder;
pub mod catalog;
pub mod connectable;
pub mod environment;
pub mod error;
pub mod graph;
pub mod router;
pub mod stream;

// --- 주요 타입 re-export ---

pub use builder::{AssetBuilder, Registry};
pub use catalog::{Catalog, DirCatalog, MemoryCatalog};
pub use connectable::{Connectable, NodeKind};
pub use environment::{build_environment, build_graph, Environment};
pub use error::EngineError;
pub use graph::Graph;
pub use router::{Router, RoutePredicate};
pub use stream::{EventRx, Lift, Tracer, UnitOp};
