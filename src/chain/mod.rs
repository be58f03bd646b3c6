//! Sequential VPN chain
//!
//! [`Chain`] walks the ordered profile list and runs one
//! [`ConnectionAttempt`] per profile. Everything the attempt needs from the
//! outside world (secrets, host network state, the VPN client, time) comes
//! in through [`Host`], so the whole chain can run against fakes.

pub mod attempt;
pub mod clock;
pub mod orchestrator;

pub use attempt::{AttemptError, AttemptOutcome, AttemptState, ConnectionAttempt};
pub use clock::{BackoffPolicy, Clock, SystemClock};
pub use orchestrator::{
    prepare_run, Chain, ChainEntry, ChainError, ChainResult, PostCheck, PublicIpLookup,
};

use crate::openvpn::VpnClient;
use crate::platform::NetworkInspector;
use crate::secret::SecretSource;
use std::sync::Arc;

/// Host capabilities used by a connection attempt
#[derive(Clone)]
pub struct Host {
    pub secrets: Arc<dyn SecretSource>,
    pub network: Arc<dyn NetworkInspector>,
    pub client: Arc<dyn VpnClient>,
    pub clock: Arc<dyn Clock>,
}
