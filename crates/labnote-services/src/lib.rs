//! Labnote export services
//!
//! Business layer of the export pipeline: the entity resolver, the maker strategies
//! (one per export format), their renderers, the audit trigger and the dispatcher that
//! ties them together. HTTP concerns stay in `labnote-api`.

pub mod audit;
pub mod dispatch;
pub mod make;
pub mod render;
pub mod resolver;

pub use audit::ExportAuditor;
pub use dispatch::{ExportDispatcher, ExportOutput, PreparedExport, StreamedArtifact};
pub use make::{BufferedArtifact, BufferedMaker, ExportContext, Maker, StreamSink, StreamingMaker};
pub use resolver::EntityResolver;
