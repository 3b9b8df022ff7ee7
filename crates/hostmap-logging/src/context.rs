//! Host context injection
//!
//! Thread-local storage for the host a piece of code is working on behalf
//! of. Spans opened while a [`HostContextGuard`] is alive carry that host
//! (see [`crate::layers::HostContextLayer`]).

use std::cell::RefCell;

use hostmap_core::HostAddress;
use uuid::Uuid;

/// Host context data stored in thread-local storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostContextData {
    /// The address the host is being reached at
    pub host: String,
    /// Unique id for this scope, to tell repeated probes of one host apart
    pub instance_id: Uuid,
}

thread_local! {
    static HOST_CONTEXT: RefCell<Option<HostContextData>> = const { RefCell::new(None) };
}

/// RAII guard for host context
///
/// Sets the host context for the current thread and restores the previous
/// one when dropped. Guards nest.
///
/// # Example
///
/// ```ignore
/// use hostmap_logging::HostContextGuard;
///
/// let _guard = HostContextGuard::for_address(&address);
/// let _span = tracing::debug_span!("probe").entered();
/// tracing::debug!("Querying neighbor table");
/// ```
pub struct HostContextGuard {
    previous: Option<HostContextData>,
}

impl HostContextGuard {
    /// Scope logs to a host reached at `address`
    pub fn for_address(address: &HostAddress) -> Self {
        let data = HostContextData {
            host: address.to_string(),
            instance_id: Uuid::new_v4(),
        };
        let previous = HOST_CONTEXT.with(|ctx| ctx.borrow_mut().replace(data));
        Self { previous }
    }

    /// Get the current host context (if any)
    pub fn current() -> Option<HostContextData> {
        HOST_CONTEXT.with(|ctx| ctx.borrow().clone())
    }

    /// Get the current host (if set)
    pub fn current_host() -> Option<String> {
        Self::current().map(|ctx| ctx.host)
    }
}

impl Drop for HostContextGuard {
    fn drop(&mut self) {
        HOST_CONTEXT.with(|ctx| *ctx.borrow_mut() = self.previous.take());
    }
}

/// Run a block with a host address in context
///
/// ```ignore
/// with_host_context!(&address, {
///     tracing::debug!("Probing");
/// });
/// ```
#[macro_export]
macro_rules! with_host_context {
    ($address:expr, $body:block) => {{
        let _guard = $crate::context::HostContextGuard::for_address($address);
        $body
    }};
}
