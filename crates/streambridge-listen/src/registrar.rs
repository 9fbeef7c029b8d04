//! Turning a [`ListenerSpec`] into endpoint registrations.

use streambridge_transport::{
    AddressResolver, DATAGRAM_SUPPORTED, ListenEndpoint, ListenOptions,
    ListenerTable, Protocol, socklen,
};

use crate::{ListenError, ListenerSpec, ServerBlock};

/// Registers listeners for one server block.
///
/// Borrows everything it touches for the duration of the configuration
/// pass. Nothing is buffered: each successful candidate goes straight
/// into the table, and a failure part-way through leaves earlier
/// registrations in place. Callers treat any error as fatal.
pub struct Registrar<'a> {
    server: &'a mut ServerBlock,
    table: &'a mut dyn ListenerTable,
    resolver: &'a dyn AddressResolver,
}

impl<'a> Registrar<'a> {
    pub fn new(
        server: &'a mut ServerBlock,
        table: &'a mut dyn ListenerTable,
        resolver: &'a dyn AddressResolver,
    ) -> Self {
        Self {
            server,
            table,
            resolver,
        }
    }

    /// Registers one endpoint per distinct address `spec.address`
    /// resolves to. Returns how many were registered.
    ///
    /// Candidates that repeat an earlier candidate of the same resolution
    /// are skipped. Repeats across calls are passed on and the table
    /// decides what to do with them.
    ///
    /// # Errors
    /// - [`ListenError::InvalidSpec`]: empty address or zero-sized option
    /// - [`ListenError::Resolve`]: the address does not resolve
    /// - [`ListenError::Incompatible`]: datagram combined with ssl,
    ///   keep-alive or PROXY protocol; nothing is registered
    /// - [`ListenError::Register`]: the table refused a candidate
    pub fn add_listener(&mut self, spec: &ListenerSpec) -> Result<usize, ListenError> {
        spec.validate()?;
        self.server.has_listen = true;

        let resolution = self.resolver.resolve(&spec.address).map_err(|source| {
            ListenError::Resolve {
                address: spec.address.clone(),
                source,
            }
        })?;

        let mut options = ListenOptions {
            wildcard: resolution.wildcard,
            ..ListenOptions::default()
        };
        if spec.udp {
            if DATAGRAM_SUPPORTED {
                options.protocol = Protocol::Datagram;
            } else {
                tracing::warn!(address = %spec.address, "datagram listeners are not supported here, using stream");
            }
        }
        options.rcvbuf = spec.rcvbuf;
        options.sndbuf = spec.sndbuf;
        if let Some(backlog) = spec.backlog {
            options.backlog = backlog;
        }
        options.tls = spec.ssl;
        options.keepalive = spec.so_keepalive;
        options.proxy_protocol = spec.proxy_protocol;

        if options.protocol == Protocol::Datagram {
            if options.tls {
                return Err(ListenError::Incompatible("ssl"));
            }
            if options.keepalive {
                return Err(ListenError::Incompatible("so_keepalive"));
            }
            if options.proxy_protocol {
                return Err(ListenError::Incompatible("proxy_protocol"));
            }
        }

        let mut registered = 0;
        for (n, candidate) in resolution.addrs.iter().enumerate() {
            let repeated = resolution.addrs[..n].iter().any(|earlier| {
                earlier.addr == candidate.addr
                    && socklen(&earlier.addr) == socklen(&candidate.addr)
            });
            if repeated {
                tracing::debug!(addr = %candidate.addr, "skipping repeated candidate");
                continue;
            }

            let endpoint = ListenEndpoint {
                addr: candidate.addr,
                socklen: socklen(&candidate.addr),
                addr_text: candidate.name.clone(),
                server: self.server.name.clone(),
                options: ListenOptions {
                    wildcard: candidate.addr.ip().is_unspecified(),
                    ..options.clone()
                },
            };
            self.table
                .register(endpoint)
                .map_err(|source| ListenError::Register {
                    address: candidate.name.clone(),
                    source,
                })?;
            registered += 1;
        }

        tracing::info!(
            server = %self.server.name,
            address = %spec.address,
            registered,
            "listener added"
        );
        Ok(registered)
    }

    /// Registers `address` as a plain stream listener if the block has no
    /// listener yet. Returns how many endpoints were registered.
    pub fn add_default(&mut self, address: &str) -> Result<usize, ListenError> {
        if self.server.has_listen {
            return Ok(0);
        }
        tracing::debug!(server = %self.server.name, address, "synthesizing default listener");
        self.add_listener(&ListenerSpec::new(address))
    }
}
