use ethers::types::U256;

/// Convert a human decimal string into the asset's smallest unit.
/// The fraction is right-padded then truncated to `decimals` digits;
/// everything stays in integer arithmetic.
pub fn parse_token_amount(amount: &str, decimals: u8) -> anyhow::Result<U256> {
    let amount = amount.trim();
    if amount.is_empty() {
        return Err(anyhow::anyhow!("empty amount"));
    }

    let (integer, fraction) = match amount.split_once('.') {
        Some((integer, fraction)) => (integer, fraction),
        None => (amount, ""),
    };
    let integer = if integer.is_empty() { "0" } else { integer };

    if !integer.bytes().all(|b| b.is_ascii_digit())
        || !fraction.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(anyhow::anyhow!("`{}` is not a decimal number", amount));
    }

    let mut padded = fraction.to_string();
    while padded.len() < decimals as usize {
        padded.push('0');
    }
    padded.truncate(decimals as usize);

    let scale = U256::exp10(decimals as usize);
    let integer = U256::from_dec_str(integer)?;
    let fraction = if padded.is_empty() {
        U256::zero()
    } else {
        U256::from_dec_str(&padded)?
    };

    let scaled = integer
        .checked_mul(scale)
        .and_then(|v| v.checked_add(fraction))
        .ok_or_else(|| anyhow::anyhow!("`{}` overflows 256 bits", amount))?;

    Ok(scaled)
}

/// Render a smallest-unit amount as a decimal string, trailing zeros
/// trimmed. Whole values render without a decimal point.
pub fn format_token_amount(amount: U256, decimals: u8) -> String {
    let divisor = U256::exp10(decimals as usize);
    let integer = amount / divisor;
    let fraction = amount % divisor;

    if fraction.is_zero() {
        return integer.to_string();
    }

    let mut fraction = format!("{:0>width$}", fraction.to_string(), width = decimals as usize);
    while fraction.ends_with('0') {
        fraction.pop();
    }
    format!("{}.{}", integer, fraction)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_whole_and_fractional_amounts() {
        assert_eq!(
            parse_token_amount("1.5", 18).unwrap(),
            U256::from_dec_str("1500000000000000000").unwrap()
        );
        assert_eq!(parse_token_amount("2.0", 18).unwrap(), U256::exp10(18) * 2);
        assert_eq!(parse_token_amount("3", 6).unwrap(), U256::from(3_000_000u64));
        assert_eq!(parse_token_amount(".5", 2).unwrap(), U256::from(50u64));
        assert_eq!(parse_token_amount("7.", 2).unwrap(), U256::from(700u64));
        assert_eq!(parse_token_amount("42", 0).unwrap(), U256::from(42u64));
    }

    #[test]
    fn truncates_excess_fraction_digits() {
        assert_eq!(parse_token_amount("1.23456", 2).unwrap(), U256::from(123u64));
    }

    #[test]
    fn rejects_non_numeric_input() {
        assert!(parse_token_amount("abc", 18).is_err());
        assert!(parse_token_amount("1.2.3", 18).is_err());
        assert!(parse_token_amount("-1", 18).is_err());
        assert!(parse_token_amount("1e5", 18).is_err());
        assert!(parse_token_amount("", 18).is_err());
        assert!(parse_token_amount("0x10", 18).is_err());
    }

    #[test]
    fn formats_with_trimmed_fraction() {
        assert_eq!(
            format_token_amount(U256::from_dec_str("1500000000000000000").unwrap(), 18),
            "1.5"
        );
        assert_eq!(format_token_amount(U256::exp10(18) * 3, 18), "3");
        assert_eq!(format_token_amount(U256::from(1u64), 18), "0.000000000000000001");
        assert_eq!(format_token_amount(U256::from(1050u64), 2), "10.5");
        assert_eq!(format_token_amount(U256::from(42u64), 0), "42");
    }

    #[test]
    fn parse_format_round_trip() {
        let samples: [u64; 7] = [0, 1, 9, 10, 1_000_000, 123_456_789, u64::MAX];
        for decimals in 0..=18u8 {
            for &sample in &samples {
                let value = U256::from(sample);
                let rendered = format_token_amount(value, decimals);
                assert_eq!(
                    parse_token_amount(&rendered, decimals).unwrap(),
                    value,
                    "x={} d={}",
                    sample,
                    decimals
                );
            }
        }
    }
}
