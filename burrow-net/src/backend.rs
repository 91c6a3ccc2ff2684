//! Link backend trait for pluggable implementations

use burrow_core::{Error, Result};
use ipnetwork::IpNetwork;
use std::collections::BTreeMap;
use std::os::fd::{AsRawFd, BorrowedFd, RawFd};
use std::sync::{Arc, Mutex, MutexGuard};

/// Trait for link-layer backends
///
/// This allows for different implementations:
/// - [`NetlinkBackend`](crate::NetlinkBackend) - Production rtnetlink
/// - [`MockBackend`] - Testing without touching the kernel
///
/// A backend is only meant for the network namespace the calling thread was
/// in when it was created. Create a new one after switching namespaces: the
/// netlink socket stays bound to the namespace it was opened in, while name
/// lookups follow the calling thread.
pub trait LinkBackend {
    /// Check whether a link with this name exists
    ///
    /// # Errors
    /// Returns error if the lookup itself fails
    fn link_exists(&mut self, name: &str) -> Result<bool>;

    /// Create a veth pair named `host` / `peer`
    ///
    /// # Errors
    /// Returns error if the kernel rejects the pair (e.g. a name is taken)
    fn create_veth(&mut self, host: &str, peer: &str) -> Result<()>;

    /// Bring a link up
    ///
    /// # Errors
    /// Returns error if the link is unknown or cannot be changed
    fn set_link_up(&mut self, name: &str) -> Result<()>;

    /// Assign an address to a link
    ///
    /// # Errors
    /// Returns error if the link is unknown or the address is rejected
    fn add_address(&mut self, name: &str, addr: IpNetwork) -> Result<()>;

    /// Move a link into the network namespace referenced by `netns`
    ///
    /// # Errors
    /// Returns error if the link is unknown or the move fails
    fn move_to_netns(&mut self, name: &str, netns: BorrowedFd<'_>) -> Result<()>;
}

/// Mock backend for testing (doesn't touch the kernel)
///
/// Links live in a map keyed by `(namespace, name)`. The host namespace is
/// `None`; a namespace reached through [`LinkBackend::move_to_netns`] is keyed
/// by the raw descriptor that referenced it. Clones share state.
///
/// # Example
/// ```
/// use burrow_net::{LinkBackend, MockBackend};
///
/// let mut backend = MockBackend::new();
/// backend.create_veth("veth0_demo", "veth1_demo").unwrap();
///
/// assert!(backend.link_exists("veth0_demo").unwrap());
/// assert_eq!(backend.veth_creations(), 1);
/// ```
#[derive(Clone)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

/// Mock view of a single link
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockLink {
    /// Link is administratively up
    pub up: bool,
    /// Assigned addresses
    pub addrs: Vec<IpNetwork>,
}

type NsKey = Option<RawFd>;

#[derive(Default)]
struct MockState {
    links: BTreeMap<(NsKey, String), MockLink>,
    current_ns: NsKey,
    veth_creations: usize,
    call_count: usize,
    fail_on: Option<&'static str>,
}

impl MockState {
    fn visible(&mut self, name: &str) -> Result<&mut MockLink> {
        let key = (self.current_ns, name.to_string());
        self.links
            .get_mut(&key)
            .ok_or_else(|| Error::link(format!("interface not found: {name}")))
    }

    fn check_failure(&self, operation: &'static str) -> Result<()> {
        if self.fail_on == Some(operation) {
            return Err(Error::link(format!("{operation}: injected failure")));
        }
        Ok(())
    }
}

impl MockBackend {
    /// Create a new mock backend with `lo` in the host namespace
    #[must_use]
    pub fn new() -> Self {
        let mut state = MockState::default();
        state.links.insert((None, "lo".to_string()), MockLink::default());
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        // A poisoned mock only means another test thread panicked
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Number of veth pairs actually created (for testing)
    #[must_use]
    pub fn veth_creations(&self) -> usize {
        self.lock().veth_creations
    }

    /// Get the number of backend calls made (for testing)
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.lock().call_count
    }

    /// Make the named operation fail from now on (for testing)
    ///
    /// Names: `create_veth`, `set_link_up`, `add_address`, `move_to_netns`.
    pub fn fail_on(&self, operation: &'static str) {
        self.lock().fail_on = Some(operation);
    }

    /// Stop injecting failures
    pub fn clear_failure(&self) {
        self.lock().fail_on = None;
    }

    /// Switch the mock's current namespace, as a `setns` would (for testing)
    ///
    /// The namespace gets its own `lo` the first time it is entered.
    pub fn enter_netns(&self, netns: BorrowedFd<'_>) {
        let mut state = self.lock();
        let ns = Some(netns.as_raw_fd());
        state.current_ns = ns;
        state
            .links
            .entry((ns, "lo".to_string()))
            .or_default();
    }

    /// Snapshot of a link visible in the current namespace (for testing)
    #[must_use]
    pub fn link(&self, name: &str) -> Option<MockLink> {
        let state = self.lock();
        state
            .links
            .get(&(state.current_ns, name.to_string()))
            .cloned()
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockBackend").finish_non_exhaustive()
    }
}

impl LinkBackend for MockBackend {
    fn link_exists(&mut self, name: &str) -> Result<bool> {
        let mut state = self.lock();
        state.call_count += 1;
        let key = (state.current_ns, name.to_string());
        Ok(state.links.contains_key(&key))
    }

    fn create_veth(&mut self, host: &str, peer: &str) -> Result<()> {
        let mut state = self.lock();
        state.call_count += 1;
        state.check_failure("create_veth")?;

        let ns = state.current_ns;
        for name in [host, peer] {
            if state.links.contains_key(&(ns, name.to_string())) {
                return Err(Error::link(format!("create veth {host}: File exists (os error 17)")));
            }
        }

        state.links.insert((ns, host.to_string()), MockLink::default());
        state.links.insert((ns, peer.to_string()), MockLink::default());
        state.veth_creations += 1;

        tracing::debug!(host, peer, "Mock: Created veth pair");

        Ok(())
    }

    fn set_link_up(&mut self, name: &str) -> Result<()> {
        let mut state = self.lock();
        state.call_count += 1;
        state.check_failure("set_link_up")?;
        state.visible(name)?.up = true;

        tracing::debug!(link = name, "Mock: Link up");

        Ok(())
    }

    fn add_address(&mut self, name: &str, addr: IpNetwork) -> Result<()> {
        let mut state = self.lock();
        state.call_count += 1;
        state.check_failure("add_address")?;

        let link = state.visible(name)?;
        if link.addrs.contains(&addr) {
            return Err(Error::link(format!("add address {addr}: File exists (os error 17)")));
        }
        link.addrs.push(addr);

        tracing::debug!(link = name, %addr, "Mock: Added address");

        Ok(())
    }

    fn move_to_netns(&mut self, name: &str, netns: BorrowedFd<'_>) -> Result<()> {
        let mut state = self.lock();
        state.call_count += 1;
        state.check_failure("move_to_netns")?;

        let key = (state.current_ns, name.to_string());
        state
            .links
            .remove(&key)
            .ok_or_else(|| Error::link(format!("interface not found: {name}")))?;

        // The kernel drops addresses and admin state on a namespace move
        state
            .links
            .insert((Some(netns.as_raw_fd()), name.to_string()), MockLink::default());

        tracing::debug!(link = name, netns = netns.as_raw_fd(), "Mock: Moved link");

        Ok(())
    }
}
