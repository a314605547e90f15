use {
    alloy_primitives::U256,
    anyhow::{Context, Result, ensure},
    bigdecimal::{BigDecimal, num_bigint::ToBigInt},
    num::{BigInt, BigUint, bigint::Sign},
};

pub fn u256_to_big_uint(input: &U256) -> BigUint {
    BigUint::from_bytes_be(&input.to_be_bytes::<32>())
}

pub fn u256_to_big_int(input: &U256) -> BigInt {
    BigInt::from_biguint(Sign::Plus, u256_to_big_uint(input))
}

pub fn u256_to_big_decimal(input: &U256) -> BigDecimal {
    BigDecimal::from(u256_to_big_int(input))
}

pub fn big_uint_to_u256(input: &BigUint) -> Result<U256> {
    let bytes = input.to_bytes_be();
    ensure!(bytes.len() <= 32, "too large");
    Ok(U256::from_be_slice(&bytes))
}

pub fn big_int_to_u256(input: &BigInt) -> Result<U256> {
    ensure!(input.sign() != Sign::Minus, "negative");
    big_uint_to_u256(input.magnitude())
}

pub fn big_decimal_to_u256(input: &BigDecimal) -> Result<U256> {
    ensure!(input.is_integer(), "not an integer");
    let big_int = input.to_bigint().context("no bigint representation")?;
    big_int_to_u256(&big_int)
}

#[cfg(test)]
mod tests {
    use {super::*, std::str::FromStr};

    #[test]
    fn u256_round_trips_through_big_decimal() {
        for value in [U256::ZERO, U256::from(42u64), U256::MAX] {
            let decimal = u256_to_big_decimal(&value);
            assert_eq!(big_decimal_to_u256(&decimal).unwrap(), value);
        }
    }

    #[test]
    fn rejects_negative_and_fractional_decimals() {
        assert!(big_decimal_to_u256(&BigDecimal::from(-1)).is_err());
        assert!(big_decimal_to_u256(&BigDecimal::from_str("0.5").unwrap()).is_err());
    }

    #[test]
    fn rejects_too_large_big_uint() {
        let too_large = BigUint::from(1u8) << 256;
        assert!(big_uint_to_u256(&too_large).is_err());
        assert_eq!(
            big_uint_to_u256(&(too_large - BigUint::from(1u8))).unwrap(),
            U256::MAX,
        );
    }
}
