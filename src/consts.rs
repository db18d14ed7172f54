pub const ENTRY_POINT_V7: &str = "0x0000000071727De22E5E9d8BAf0edAc6f37da032";
/// TransferEventWrapper deployed on Monad testnet
pub const TRANSFER_EVENT_WRAPPER: &str = "0xFf71Ff614d6B621541408Adce546bF68Ad399b5d";

pub const NATIVE_DECIMALS: u8 = 18;

/// Gas reserve withheld from the native balance check, in wei.
/// 0.001 native units for a single transfer, 0.01 for a batch.
pub const SINGLE_TRANSFER_RESERVE_WEI: u64 = 1_000_000_000_000_000;
pub const BATCH_TRANSFER_RESERVE_WEI: u64 = 10_000_000_000_000_000;

/// Fixed minimal priority fee (0.000001 native units).
pub const PRIORITY_FEE_WEI: u64 = 1_000_000_000_000;
/// max_fee_per_gas = gas_price * FEE_BUFFER_PERCENT / 100
pub const FEE_BUFFER_PERCENT: u64 = 150;

/// Receipt polling cadence and deadline, in seconds.
pub const RECEIPT_POLL_INTERVAL_SECS: u64 = 2;
pub const RECEIPT_WAIT_DEADLINE_SECS: u64 = 120;
