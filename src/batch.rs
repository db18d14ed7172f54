use crate::amounts::parse_token_amount;
use crate::errors::{BatchInputError, RecipientField};
use ethers::types::{Address, U256};
use regex::Regex;

const ADDRESS_PATTERN: &str = r"^0x[0-9a-fA-F]{40}$";

/// One recipient as entered by the user, not yet validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecipient {
    pub address: String,
    pub amount: String,
}

impl RawRecipient {
    pub fn new(address: impl Into<String>, amount: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            amount: amount.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferRecipient {
    pub address: Address,
    pub amount: U256,
}

/// A batch moves exactly one asset: native currency or a single token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Native,
    Erc20(Address),
}

impl AssetKind {
    /// Tag carried by the batch event for the indexer.
    pub fn tag(&self) -> &'static str {
        match self {
            AssetKind::Native => "native",
            AssetKind::Erc20(_) => "erc20",
        }
    }

    pub fn token_address(&self) -> Address {
        match self {
            AssetKind::Native => Address::zero(),
            AssetKind::Erc20(token) => *token,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRequest {
    pub asset: AssetKind,
    pub recipients: Vec<TransferRecipient>,
}

impl BatchRequest {
    /// Exact integer sum of recipient amounts; `None` if the sum does
    /// not fit in 256 bits.
    pub fn total_amount(&self) -> Option<U256> {
        self.recipients
            .iter()
            .try_fold(U256::zero(), |sum, r| sum.checked_add(r.amount))
    }

    pub fn len(&self) -> usize {
        self.recipients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipients.is_empty()
    }
}

/// Parse `address,amount` lines into raw rows. Blank lines are dropped;
/// row numbers in errors refer to the remaining lines, 1-indexed.
pub fn parse_recipients_csv(csv: &str) -> Result<Vec<RawRecipient>, BatchInputError> {
    let mut rows = Vec::new();

    for line in csv.lines().map(str::trim).filter(|line| !line.is_empty()) {
        let row = rows.len() + 1;
        let (address, amount) = line
            .split_once(',')
            .ok_or(BatchInputError::MalformedLine { row })?;
        let (address, amount) = (address.trim(), amount.trim());
        if address.is_empty() || amount.is_empty() {
            return Err(BatchInputError::MalformedLine { row });
        }
        rows.push(RawRecipient::new(address, amount));
    }

    if rows.is_empty() {
        return Err(BatchInputError::EmptyInput);
    }
    Ok(rows)
}

/// Render rows back to CSV text. `parse_recipients_csv` of the result
/// yields the same rows.
pub fn recipients_to_csv(rows: &[RawRecipient]) -> String {
    rows.iter()
        .map(|r| format!("{},{}", r.address, r.amount))
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_positive_decimal(amount: &str) -> bool {
    let (integer, fraction) = match amount.split_once('.') {
        Some((integer, fraction)) => (integer, fraction),
        None => (amount, ""),
    };
    if integer.is_empty() && fraction.is_empty() {
        return false;
    }
    if !integer.bytes().all(|b| b.is_ascii_digit()) || !fraction.bytes().all(|b| b.is_ascii_digit())
    {
        return false;
    }
    integer.bytes().chain(fraction.bytes()).any(|b| b != b'0')
}

/// Check every row before anything touches the network.
pub fn validate_recipients(rows: &[RawRecipient]) -> Result<(), BatchInputError> {
    if rows.is_empty() {
        return Err(BatchInputError::EmptyInput);
    }

    let address_re = Regex::new(ADDRESS_PATTERN).unwrap();
    for (index, recipient) in rows.iter().enumerate() {
        let row = index + 1;
        let address = recipient.address.trim();
        let amount = recipient.amount.trim();

        if address.is_empty() {
            return Err(BatchInputError::MissingField {
                row,
                field: RecipientField::Address,
            });
        }
        if amount.is_empty() {
            return Err(BatchInputError::MissingField {
                row,
                field: RecipientField::Amount,
            });
        }
        if !address_re.is_match(address) {
            return Err(BatchInputError::InvalidAddress { row });
        }
        if !is_positive_decimal(amount) {
            return Err(BatchInputError::InvalidAmount { row });
        }
    }
    Ok(())
}

/// Validate rows and convert amounts to the asset's smallest unit.
/// Pure transform; the caller supplies the asset's decimals (18 for
/// native, the queried `decimals()` for a token).
pub fn build_batch_request(
    rows: &[RawRecipient],
    asset: AssetKind,
    decimals: u8,
) -> Result<BatchRequest, BatchInputError> {
    validate_recipients(rows)?;

    let mut recipients = Vec::with_capacity(rows.len());
    let mut total = U256::zero();
    for (index, raw) in rows.iter().enumerate() {
        let row = index + 1;
        let address = raw
            .address
            .trim()
            .parse::<Address>()
            .map_err(|_| BatchInputError::InvalidAddress { row })?;
        let amount = parse_token_amount(raw.amount.trim(), decimals)
            .map_err(|_| BatchInputError::InvalidAmount { row })?;
        // A positive decimal can still truncate to zero at low precision.
        if amount.is_zero() {
            return Err(BatchInputError::InvalidAmount { row });
        }
        total = total
            .checked_add(amount)
            .ok_or(BatchInputError::TotalOverflow)?;
        recipients.push(TransferRecipient { address, amount });
    }

    Ok(BatchRequest { asset, recipients })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::NATIVE_DECIMALS;

    const ADDR_A: &str = "0xAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA1111";
    const ADDR_B: &str = "0xBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBB2222";

    #[test]
    fn csv_keeps_rows_in_file_order() {
        let csv = format!("{},1.5\n\n  {} , 2.0  \n", ADDR_A, ADDR_B);
        let rows = parse_recipients_csv(&csv).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], RawRecipient::new(ADDR_A, "1.5"));
        assert_eq!(rows[1], RawRecipient::new(ADDR_B, "2.0"));
    }

    #[test]
    fn csv_reserialize_reparse_is_idempotent() {
        let csv = format!("{},1.5\n{},2.0", ADDR_A, ADDR_B);
        let rows = parse_recipients_csv(&csv).unwrap();
        let reparsed = parse_recipients_csv(&recipients_to_csv(&rows)).unwrap();
        assert_eq!(rows, reparsed);
    }

    #[test]
    fn csv_rejects_empty_and_malformed_input() {
        assert_eq!(parse_recipients_csv(""), Err(BatchInputError::EmptyInput));
        assert_eq!(
            parse_recipients_csv("\n  \n"),
            Err(BatchInputError::EmptyInput)
        );
        assert_eq!(
            parse_recipients_csv(&format!("{},1.0\nno-comma-here", ADDR_A)),
            Err(BatchInputError::MalformedLine { row: 2 })
        );
        assert_eq!(
            parse_recipients_csv(&format!("{},", ADDR_A)),
            Err(BatchInputError::MalformedLine { row: 1 })
        );
    }

    #[test]
    fn validation_reports_one_indexed_rows() {
        let rows = vec![
            RawRecipient::new(ADDR_A, "1.0"),
            RawRecipient::new("0x1234", "1.0"),
        ];
        assert_eq!(
            validate_recipients(&rows),
            Err(BatchInputError::InvalidAddress { row: 2 })
        );

        let rows = vec![
            RawRecipient::new(ADDR_A, "0"),
            RawRecipient::new(ADDR_B, "1.0"),
        ];
        assert_eq!(
            validate_recipients(&rows),
            Err(BatchInputError::InvalidAmount { row: 1 })
        );
    }

    #[test]
    fn validation_rejects_bad_amounts() {
        for bad in ["0", "0.000", "-1", "abc", "1,5", ""] {
            let rows = vec![RawRecipient::new(ADDR_A, bad)];
            assert!(validate_recipients(&rows).is_err(), "amount `{}`", bad);
        }
    }

    #[test]
    fn validation_accepts_mixed_case_addresses() {
        let rows = vec![RawRecipient::new(
            "0xaAbBcCdDeEfF00112233445566778899aAbBcCdD",
            "0.5",
        )];
        assert!(validate_recipients(&rows).is_ok());
    }

    #[test]
    fn batch_total_is_exact_sum() {
        let rows = vec![
            RawRecipient::new(ADDR_A, "1.5"),
            RawRecipient::new(ADDR_B, "2.0"),
        ];
        let batch = build_batch_request(&rows, AssetKind::Native, NATIVE_DECIMALS).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(
            batch.recipients[0].amount,
            U256::from_dec_str("1500000000000000000").unwrap()
        );
        assert_eq!(
            batch.recipients[1].amount,
            U256::from_dec_str("2000000000000000000").unwrap()
        );
        assert_eq!(
            batch.total_amount().unwrap(),
            U256::from_dec_str("3500000000000000000").unwrap()
        );
    }

    #[test]
    fn batch_rejects_overflowing_total() {
        use crate::amounts::format_token_amount;

        // Each row parses back to exactly U256::MAX, so the second one
        // pushes the running total past 256 bits.
        let max = format_token_amount(U256::max_value(), NATIVE_DECIMALS);
        let rows = vec![
            RawRecipient::new(ADDR_A, max.clone()),
            RawRecipient::new(ADDR_B, max),
        ];
        assert_eq!(
            build_batch_request(&rows, AssetKind::Native, NATIVE_DECIMALS),
            Err(BatchInputError::TotalOverflow)
        );

        let request = BatchRequest {
            asset: AssetKind::Native,
            recipients: vec![
                TransferRecipient {
                    address: ADDR_A.parse().unwrap(),
                    amount: U256::max_value(),
                },
                TransferRecipient {
                    address: ADDR_B.parse().unwrap(),
                    amount: U256::one(),
                },
            ],
        };
        assert_eq!(request.total_amount(), None);
    }

    #[test]
    fn batch_rejects_amount_that_truncates_to_zero() {
        let rows = vec![RawRecipient::new(ADDR_A, "0.001")];
        assert_eq!(
            build_batch_request(&rows, AssetKind::Native, 0),
            Err(BatchInputError::InvalidAmount { row: 1 })
        );
    }

    #[test]
    fn asset_kind_tags_and_token_address() {
        assert_eq!(AssetKind::Native.tag(), "native");
        assert_eq!(AssetKind::Native.token_address(), Address::zero());
        let token: Address = ADDR_A.parse().unwrap();
        assert_eq!(AssetKind::Erc20(token).tag(), "erc20");
        assert_eq!(AssetKind::Erc20(token).token_address(), token);
    }
}
