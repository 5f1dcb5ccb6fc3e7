pub mod checkpoint;
pub mod config;
pub mod report;
pub mod target;

pub use checkpoint::Checkpoint;
pub use config::{
    OutputFormat, OutputOptions, ProbeMode, ResolverBackend, ScannerConfig, VendorOptions,
    WriteMode,
};
pub use report::{
    HttpAttributes, ImapAttributes, Pop3Attributes, Protocol, ProtocolAttributes, ProtocolDetails,
    ProtocolResult, ScanReport, SmtpAttributes,
};
pub use target::{Target, TargetKind};
