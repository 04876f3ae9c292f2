use thiserror::Error;

#[derive(Debug, Error)]
pub enum WolError {
    #[error("could not open broadcast socket: {0}")]
    Socket(#[source] std::io::Error),

    #[error("magic packet delivery failed to every destination: {0}")]
    AllDestinationsFailed(String),
}

#[derive(Debug, Error)]
pub enum SshError {
    #[error("authentication failed for {user}@{host}")]
    Auth { host: String, user: String },

    #[error("connection to {host}:{port} timed out")]
    Timeout { host: String, port: u16 },

    #[error("connection to {host}:{port} refused")]
    Refused { host: String, port: u16 },

    #[error("could not resolve host {host}")]
    Dns { host: String },

    #[error("ssh transport error on {host}: {message}")]
    Transport { host: String, message: String },
}

#[derive(Debug, Error)]
pub enum HypervisorError {
    #[error("hypervisor request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("hypervisor API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("unexpected hypervisor response: {0}")]
    Decode(String),
}
