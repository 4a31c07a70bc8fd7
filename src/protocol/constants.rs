//! Protocol constants

/// Protocol version 3.0
pub const PROTOCOL_VERSION: u32 = 0x0003_0000;

/// SSLRequest code (80877103 = 1234 << 16 | 5679)
pub const SSL_REQUEST_CODE: u32 = 0x04D2_162F;

/// SASL mechanism implemented by this client
pub const SCRAM_SHA_256: &str = "SCRAM-SHA-256";

/// Message type tags
pub mod tags {
    /// Authentication request
    pub const AUTHENTICATION: u8 = b'R';

    /// Backend key data
    pub const BACKEND_KEY_DATA: u8 = b'K';

    /// Command complete
    pub const COMMAND_COMPLETE: u8 = b'C';

    /// Data row
    pub const DATA_ROW: u8 = b'D';

    /// Empty query response
    pub const EMPTY_QUERY_RESPONSE: u8 = b'I';

    /// Error response
    pub const ERROR_RESPONSE: u8 = b'E';

    /// Negotiate protocol version
    pub const NEGOTIATE_PROTOCOL_VERSION: u8 = b'v';

    /// Notice response
    pub const NOTICE_RESPONSE: u8 = b'N';

    /// Parameter status
    pub const PARAMETER_STATUS: u8 = b'S';

    /// Ready for query
    pub const READY_FOR_QUERY: u8 = b'Z';

    /// Row description
    pub const ROW_DESCRIPTION: u8 = b'T';
}

/// Authentication request subtypes
pub mod auth {
    /// Authentication successful
    pub const OK: u32 = 0;

    /// Cleartext password required
    pub const CLEARTEXT_PASSWORD: u32 = 3;

    /// MD5 password required
    pub const MD5_PASSWORD: u32 = 5;

    /// SASL mechanisms available (Postgres 10+)
    pub const SASL: u32 = 10;

    /// SASL server challenge
    pub const SASL_CONTINUE: u32 = 11;

    /// SASL server final message
    pub const SASL_FINAL: u32 = 12;
}

/// Transaction status bytes carried by ReadyForQuery
pub mod tx_status {
    /// Idle (not in a transaction)
    pub const IDLE: u8 = b'I';

    /// In a transaction block
    pub const IN_TRANSACTION: u8 = b'T';

    /// Failed transaction (queries rejected until rollback)
    pub const FAILED: u8 = b'E';
}
