use crate::repository::LogEntry;
use alloy::sol;
use alloy::sol_types::SolEvent;

sol! {
    event Transfer(address indexed from, address indexed to, uint256 value);

    function name() external view returns (string);
    function symbol() external view returns (string);
    function decimals() external view returns (uint8);
    function totalSupply() external view returns (uint256);
    function balanceOf(address owner) external view returns (uint256);
}

/// True when the first topic is the `Transfer(address,address,uint256)` signature.
pub fn is_transfer(log: &LogEntry) -> bool {
    log.topics.first() == Some(&Transfer::SIGNATURE_HASH)
}

pub fn decode_transfer_event(log: &LogEntry) -> anyhow::Result<Transfer> {
    if !is_transfer(log) {
        anyhow::bail!("Log from {:?} is not a Transfer event", log.address);
    }
    let decoded = Transfer::decode_raw_log(log.topics.iter().copied(), &log.data)?;
    Ok(decoded)
}
