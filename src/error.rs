use derive_more::{Display, Error};

pub type Error = exn::Exn<AppError>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum AppError {
    #[display("unable to load configuration")]
    Config,
    #[display("unable to open the archive")]
    Archive,
    #[display("the ledger is unavailable")]
    Ledger,
    #[display("unable to start the service")]
    Start,
    #[display("unable to listen for shutdown signals")]
    Signal,
    #[display("{failed} of {total} files could not be ingested")]
    Ingest { failed: usize, total: usize },
}
