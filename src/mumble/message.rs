use crate::transport::errors::TransportError;

/// Control message kinds, numbered as they appear in the envelope type field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum MessageKind {
    Version = 0,
    UdpTunnel = 1,
    Authenticate = 2,
    Ping = 3,
    Reject = 4,
    ServerSync = 5,
    ChannelRemove = 6,
    ChannelState = 7,
    UserRemove = 8,
    UserState = 9,
    BanList = 10,
    TextMessage = 11,
    PermissionDenied = 12,
    Acl = 13,
    QueryUsers = 14,
    CryptSetup = 15,
    ContextActionModify = 16,
    ContextAction = 17,
    UserList = 18,
    VoiceTarget = 19,
    PermissionQuery = 20,
    CodecVersion = 21,
    UserStats = 22,
    RequestBlob = 23,
    ServerConfig = 24,
    SuggestConfig = 25,
    PluginDataTransmission = 26,
}

impl MessageKind {
    pub fn code(self) -> u16 {
        self as u16
    }
}

impl TryFrom<u16> for MessageKind {
    type Error = TransportError;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        let kind = match code {
            0 => MessageKind::Version,
            1 => MessageKind::UdpTunnel,
            2 => MessageKind::Authenticate,
            3 => MessageKind::Ping,
            4 => MessageKind::Reject,
            5 => MessageKind::ServerSync,
            6 => MessageKind::ChannelRemove,
            7 => MessageKind::ChannelState,
            8 => MessageKind::UserRemove,
            9 => MessageKind::UserState,
            10 => MessageKind::BanList,
            11 => MessageKind::TextMessage,
            12 => MessageKind::PermissionDenied,
            13 => MessageKind::Acl,
            14 => MessageKind::QueryUsers,
            15 => MessageKind::CryptSetup,
            16 => MessageKind::ContextActionModify,
            17 => MessageKind::ContextAction,
            18 => MessageKind::UserList,
            19 => MessageKind::VoiceTarget,
            20 => MessageKind::PermissionQuery,
            21 => MessageKind::CodecVersion,
            22 => MessageKind::UserStats,
            23 => MessageKind::RequestBlob,
            24 => MessageKind::ServerConfig,
            25 => MessageKind::SuggestConfig,
            26 => MessageKind::PluginDataTransmission,
            other => {
                return Err(TransportError::Protocol(format!(
                    "unknown message type {other}"
                )))
            }
        };
        Ok(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::MessageKind;
    use crate::transport::errors::TransportError;

    /// Every code in the known range resolves to the kind carrying that code.
    #[test]
    fn known_codes_round_trip() {
        for code in 0..=26u16 {
            let kind = MessageKind::try_from(code).expect("known code");
            assert_eq!(kind.code(), code);
        }
    }

    /// Well-known codes used during the handshake are fixed.
    #[test]
    fn handshake_codes_are_stable() {
        assert_eq!(MessageKind::Version.code(), 0);
        assert_eq!(MessageKind::UdpTunnel.code(), 1);
        assert_eq!(MessageKind::Authenticate.code(), 2);
        assert_eq!(MessageKind::Ping.code(), 3);
        assert_eq!(MessageKind::ServerSync.code(), 5);
        assert_eq!(MessageKind::UserState.code(), 9);
    }

    /// Codes past the last known kind are protocol errors.
    #[test]
    fn out_of_range_code_is_protocol_error() {
        let err = MessageKind::try_from(27).expect_err("expected unknown type");
        assert!(matches!(err, TransportError::Protocol(_)));
        assert!(MessageKind::try_from(u16::MAX).is_err());
    }
}
