pub mod audit;
pub mod backend;
pub mod category;
pub mod concat;
pub mod config;
pub mod cycle;
pub mod lock;
pub mod manifest;
pub mod merge;
pub mod namer;
pub mod partition;
pub mod paths;
pub mod publish;
pub mod snapshot;
pub mod sweep;
pub mod warn;
