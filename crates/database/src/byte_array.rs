use {
    sqlx::{
        Decode, Encode, Postgres, Type,
        encode::IsNull,
        error::BoxDynError,
        postgres::{PgArgumentBuffer, PgTypeInfo, PgValueRef},
    },
    std::fmt,
};

/// Fixed-width byte arrays stored as `bytea` columns.
///
/// The width is checked on decode so a corrupt column surfaces as an error
/// instead of a truncated value.
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ByteArray<const N: usize>(pub [u8; N]);

impl<const N: usize> Default for ByteArray<N> {
    fn default() -> Self {
        Self([0u8; N])
    }
}

impl<const N: usize> fmt::Debug for ByteArray<N> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "0x")?;
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl<const N: usize> Type<Postgres> for ByteArray<N> {
    fn type_info() -> PgTypeInfo {
        <Vec<u8> as Type<Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        <Vec<u8> as Type<Postgres>>::compatible(ty)
    }
}

impl<'r, const N: usize> Decode<'r, Postgres> for ByteArray<N> {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let bytes = <&[u8] as Decode<Postgres>>::decode(value)?;
        Ok(Self(bytes.try_into().map_err(|_| {
            format!("expected {} bytes, got {}", N, bytes.len())
        })?))
    }
}

impl<'q, const N: usize> Encode<'q, Postgres> for ByteArray<N> {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> Result<IsNull, BoxDynError> {
        buf.extend_from_slice(&self.0);
        Ok(IsNull::No)
    }
}

#[cfg(test)]
mod tests {
    use {super::*, sqlx::{Connection, PgConnection, Row}};

    #[test]
    fn debug_formats_as_hex() {
        assert_eq!(format!("{:?}", ByteArray([0xab; 2])), "0xabab");
    }

    #[tokio::test]
    #[ignore]
    async fn postgres_byte_array_roundtrip() {
        let mut db = PgConnection::connect("postgresql://").await.unwrap();
        let mut db = db.begin().await.unwrap();

        let value = ByteArray([0x42u8; 20]);
        let row = sqlx::query("SELECT $1::bytea AS val")
            .bind(value)
            .fetch_one(&mut *db)
            .await
            .unwrap();
        let read: ByteArray<20> = row.try_get("val").unwrap();
        assert_eq!(read, value);

        // Wrong width fails to decode instead of silently truncating.
        let row = sqlx::query("SELECT $1::bytea AS val")
            .bind(value)
            .fetch_one(&mut *db)
            .await
            .unwrap();
        let read: Result<ByteArray<32>, _> = row.try_get("val");
        assert!(read.is_err());
    }
}
