//! Run-local sequential address pool.

use std::net::Ipv4Addr;

use crate::console::InterfaceAddress;

/// Hands out consecutive host addresses inside one subnet.
///
/// Scoped to a single provisioning run; nothing is persisted, so a second
/// process reusing the same control-plane project starts numbering again
/// from the first host.
#[derive(Debug, Clone)]
pub struct AddressPool {
    network: u32,
    prefix_len: u8,
    interface: String,
    next_host: u32,
}

impl AddressPool {
    /// Pool over `network/prefix_len` starting at host number `first_host`.
    ///
    /// `network`'s host bits are cleared.
    #[must_use]
    pub fn new(network: Ipv4Addr, prefix_len: u8, first_host: u32, interface: impl Into<String>) -> Self {
        let prefix_len = prefix_len.min(32);
        Self {
            network: u32::from(network) & Self::mask(prefix_len),
            prefix_len,
            interface: interface.into(),
            next_host: first_host,
        }
    }

    const fn mask(prefix_len: u8) -> u32 {
        if prefix_len == 0 {
            0
        } else {
            u32::MAX << (32 - prefix_len as u32)
        }
    }

    /// Highest usable host number (the broadcast address is excluded).
    fn max_host(&self) -> u32 {
        let host_bits = 32 - u32::from(self.prefix_len);
        match host_bits {
            0 => 0,
            1 => 1,
            _ => u32::try_from((1u64 << host_bits) - 2).unwrap_or(u32::MAX - 1),
        }
    }

    /// The address the next successful assignment will receive, if any remain.
    #[must_use]
    pub fn peek(&self) -> Option<InterfaceAddress> {
        if self.next_host == 0 || self.next_host > self.max_host() {
            return None;
        }
        Some(InterfaceAddress {
            interface: self.interface.clone(),
            address: Ipv4Addr::from(self.network | self.next_host),
            prefix_len: self.prefix_len,
        })
    }

    /// Mark the peeked address as used.
    pub fn commit(&mut self) {
        self.next_host = self.next_host.saturating_add(1);
    }

    /// Subnet prefix length.
    #[must_use]
    pub const fn prefix_len(&self) -> u8 {
        self.prefix_len
    }
}
