use ethers::{types::Address, utils::to_checksum};
use serde::Serializer;

pub fn as_checksum<S>(address: &Address, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&to_checksum(address, None))
}
