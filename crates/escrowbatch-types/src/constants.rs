//! System-wide constants for the EscrowBatch engine.

/// Decimal places kept for reported averages (USDC precision).
pub const AMOUNT_PRECISION: u32 = 6;

/// Basis-point scale for rates (10_000 = 100%).
pub const BPS_SCALE: u64 = 10_000;

/// Pending payment count that triggers a batch below the max amount.
pub const MIN_PAYMENTS_PER_BATCH: usize = 3;

/// Default settlement currency for new merchants.
pub const DEFAULT_CURRENCY: &str = "USDC";

/// Default minimum batch amount (whole currency units).
pub const DEFAULT_MIN_BATCH_AMOUNT: i64 = 100;

/// Default maximum batch amount (whole currency units).
pub const DEFAULT_MAX_BATCH_AMOUNT: i64 = 10_000;

/// Default advisory batch time, `HH:MM` UTC.
pub const DEFAULT_BATCH_TIME: &str = "14:00";

/// Credential prefix for the Enterprise tier.
pub const ENTERPRISE_CREDENTIAL_PREFIX: &str = "sk_enterprise_";

/// Credential prefix for the Business tier.
pub const BUSINESS_CREDENTIAL_PREFIX: &str = "sk_business_";

/// Default cap on a single settlement's cost, in rail cost units.
pub const DEFAULT_MAX_SETTLEMENT_COST: u64 = 100_000;

/// Default priority fee passed to the settlement rail.
pub const DEFAULT_PRIORITY_FEE: u64 = 1_000;

/// Default attempt budget handed to the settlement rail.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Default settlement timeout in seconds.
pub const DEFAULT_SETTLEMENT_TIMEOUT_SECS: u64 = 300;

/// Longest accepted settlement timeout (one week).
pub const MAX_SETTLEMENT_TIMEOUT_SECS: u64 = 7 * 24 * 60 * 60;

/// Prefix of the escrow account reference derived from the merchant id.
pub const ESCROW_REF_PREFIX: &str = "escrow";

/// Domain separator for batch membership commitments.
pub const BATCH_COMMITMENT_DOMAIN: &[u8] = b"escrowbatch:batch:v1:";

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name.
pub const ENGINE_NAME: &str = "EscrowBatch";
