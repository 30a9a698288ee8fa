//! Control Block
//!
//! Read-mostly device metadata shared by every connection: the device
//! identity and the server id reported by Report Server ID (FC17).

use crate::device::identity::DeviceIdentity;
use crate::protocol::types::MAX_PDU_SIZE;
use bytes::Bytes;

/// Server id reported when the identity does not name a product.
pub const DEFAULT_SERVER_ID: &str = "FlashBus";

/// Longest server id an FC17 response can carry next to its function code,
/// byte count and run indicator.
pub const MAX_SERVER_ID_LEN: usize = MAX_PDU_SIZE - 3;

/// Conformity level: regular identification, stream and individual access.
pub const CONFORMITY_LEVEL: u8 = 0x82;

/// Device metadata shared by all connections.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControlBlock {
    identity: DeviceIdentity,
}

impl ControlBlock {
    /// Creates a control block with an empty identity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a control block, applying `identity` over the default one.
    pub fn with_identity(identity: Option<&DeviceIdentity>) -> Self {
        let mut control = Self::new();
        if let Some(identity) = identity {
            control.identity.update(identity);
        }
        control
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    /// The server id reported by FC17: the product code when set, the vendor
    /// name otherwise, falling back to [`DEFAULT_SERVER_ID`]. Cut to
    /// [`MAX_SERVER_ID_LEN`] bytes.
    pub fn server_id(&self) -> Bytes {
        let id = [&self.identity.product_code, &self.identity.vendor_name]
            .into_iter()
            .find(|s| !s.is_empty())
            .map(String::as_str)
            .unwrap_or(DEFAULT_SERVER_ID)
            .as_bytes();
        Bytes::copy_from_slice(&id[..id.len().min(MAX_SERVER_ID_LEN)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_identity_is_empty() {
        let control = ControlBlock::with_identity(None);
        assert_eq!(control.identity(), &DeviceIdentity::default());
        assert_eq!(control.server_id(), Bytes::from_static(b"FlashBus"));
    }

    #[test]
    fn test_identity_override() {
        let identity = DeviceIdentity {
            vendor_name: "Acme".to_string(),
            ..Default::default()
        };
        let control = ControlBlock::with_identity(Some(&identity));

        assert_eq!(control.identity().vendor_name, "Acme");
        assert_eq!(control.server_id(), Bytes::from_static(b"Acme"));
    }

    #[test]
    fn test_server_id_prefers_product_code() {
        let identity = DeviceIdentity {
            vendor_name: "Acme".to_string(),
            product_code: "AC-1".to_string(),
            ..Default::default()
        };
        let control = ControlBlock::with_identity(Some(&identity));
        assert_eq!(control.server_id(), Bytes::from_static(b"AC-1"));
    }

    #[test]
    fn test_server_id_is_cut_to_pdu_size() {
        let identity = DeviceIdentity {
            product_code: "p".repeat(400),
            ..Default::default()
        };
        let control = ControlBlock::with_identity(Some(&identity));
        assert_eq!(control.server_id().len(), MAX_SERVER_ID_LEN);
    }
}
