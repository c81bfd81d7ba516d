pub mod bridge;
pub mod export;
pub mod markdown;
pub mod protocol;

pub use bridge::{DocumentSource, LoadedDocument, BRIDGE_JS};
pub use export::{ExportFormat, PdfRenderer};
pub use protocol::{ContentFormat, PageEvent, ShellCommand};
