/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The same (protocol, address) pair was registered twice.
    #[error("duplicate \"{0}\" address and port pair")]
    DuplicateEndpoint(String),

    /// Binding a listen socket failed.
    #[error("bind to {addr} failed: {source}")]
    BindFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The endpoint asks for something this server cannot provide.
    #[error("{option} is not supported on {addr}")]
    Unsupported { option: &'static str, addr: String },

    /// Accepting a connection failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// Receiving a datagram failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// The peer sent nothing before the read deadline.
    #[error("no data received within {0:?}")]
    ReadTimeout(std::time::Duration),

    /// Writing a reply to the peer failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),
}
