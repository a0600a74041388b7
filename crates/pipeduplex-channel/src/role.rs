use std::fmt;
use std::str::FromStr;

use pipeduplex_transport::EndpointName;
use serde::{Deserialize, Serialize};

use crate::error::{ChannelError, Result};

/// Which side of the handshake ordering a process takes.
///
/// Both processes must be configured with opposite roles; the role is never
/// negotiated over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Listens on endpoint B first, then connects to endpoint A.
    Initiator,
    /// Connects to endpoint B first, then listens on endpoint A.
    Responder,
}

impl Role {
    /// The role the peer process must take.
    pub fn opposite(self) -> Self {
        match self {
            Role::Initiator => Role::Responder,
            Role::Responder => Role::Initiator,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Initiator => "initiator",
            Role::Responder => "responder",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ChannelError;

    /// Parses `initiator`/`responder`, also accepting `client`/`server`.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "initiator" | "client" => Ok(Role::Initiator),
            "responder" | "server" => Ok(Role::Responder),
            other => Err(ChannelError::InvalidRole(other.to_string())),
        }
    }
}

/// The two endpoint identifiers of one duplex channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointPair {
    /// Endpoint A: written by the responder, read by the initiator.
    pub a: EndpointName,
    /// Endpoint B: written by the initiator, read by the responder.
    pub b: EndpointName,
}

impl EndpointPair {
    pub fn new(a: EndpointName, b: EndpointName) -> Self {
        Self { a, b }
    }

    /// Validate two identifiers and build a pair.
    pub fn parse(a: &str, b: &str) -> Result<Self> {
        Ok(Self::new(EndpointName::new(a)?, EndpointName::new(b)?))
    }

    /// True when both directions share one name.
    pub fn is_shared(&self) -> bool {
        self.a == self.b
    }
}

/// How this process opens an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Listen,
    Connect,
}

/// Which way this process uses an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

/// One step of the handshake: open `endpoint` in `mode`, then use it for `direction`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointStep {
    pub endpoint: EndpointName,
    pub mode: Mode,
    pub direction: Direction,
}

impl EndpointStep {
    fn listen(endpoint: &EndpointName) -> Self {
        Self {
            endpoint: endpoint.clone(),
            mode: Mode::Listen,
            direction: Direction::Write,
        }
    }

    fn connect(endpoint: &EndpointName) -> Self {
        Self {
            endpoint: endpoint.clone(),
            mode: Mode::Connect,
            direction: Direction::Read,
        }
    }
}

/// Ordered endpoint steps for one role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakePlan {
    role: Role,
    steps: [EndpointStep; 2],
}

impl HandshakePlan {
    pub fn role(&self) -> Role {
        self.role
    }

    /// Steps in the order they must be performed.
    pub fn steps(&self) -> &[EndpointStep; 2] {
        &self.steps
    }

    /// The endpoint this process listens on (and writes to).
    pub fn listen_step(&self) -> &EndpointStep {
        self.step_with(Mode::Listen)
    }

    /// The endpoint this process connects to (and reads from).
    pub fn connect_step(&self) -> &EndpointStep {
        self.step_with(Mode::Connect)
    }

    pub fn read_endpoint(&self) -> &EndpointName {
        &self.connect_step().endpoint
    }

    pub fn write_endpoint(&self) -> &EndpointName {
        &self.listen_step().endpoint
    }

    fn step_with(&self, mode: Mode) -> &EndpointStep {
        // resolve() always emits exactly one step per mode
        if self.steps[0].mode == mode {
            &self.steps[0]
        } else {
            &self.steps[1]
        }
    }
}

/// Decide listen/connect order and direction for `role`.
///
/// The initiator listens on B and, once the responder has connected to it,
/// connects to A. The responder mirrors that order: it connects to B first and
/// then listens on A. Whichever process starts first, the connecting side
/// waits for the listener, so the bootstrap cannot deadlock.
pub fn resolve(pair: &EndpointPair, role: Role) -> HandshakePlan {
    let steps = match role {
        Role::Initiator => [EndpointStep::listen(&pair.b), EndpointStep::connect(&pair.a)],
        Role::Responder => [EndpointStep::connect(&pair.b), EndpointStep::listen(&pair.a)],
    };
    HandshakePlan { role, steps }
}
