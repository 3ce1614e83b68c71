//! Static script analysis: opcode iteration, signature-operation counting,
//! output-template recognition, and transaction standardness.
//!
//! Script *execution* (stack evaluation and ECDSA) is an external
//! collaborator behind the validator's script-engine seam; everything here
//! is decidable from the raw script bytes.

use crate::constants::{
    CURRENT_TX_VERSION, MAX_STANDARD_SIGSCRIPT_SIZE, MAX_STANDARD_TX_SIZE,
};
use crate::error::PolicyError;
use crate::ser::{Encodable, SerMode};
use crate::types::{Transaction, TxOut};

pub const OP_0: u8 = 0x00;
pub const OP_PUSHDATA1: u8 = 0x4C;
pub const OP_PUSHDATA2: u8 = 0x4D;
pub const OP_PUSHDATA4: u8 = 0x4E;
pub const OP_1NEGATE: u8 = 0x4F;
pub const OP_1: u8 = 0x51;
pub const OP_16: u8 = 0x60;
pub const OP_RETURN: u8 = 0x6A;
pub const OP_DUP: u8 = 0x76;
pub const OP_EQUAL: u8 = 0x87;
pub const OP_EQUALVERIFY: u8 = 0x88;
pub const OP_HASH160: u8 = 0xA9;
pub const OP_CHECKSIG: u8 = 0xAC;
pub const OP_CHECKSIGVERIFY: u8 = 0xAD;
pub const OP_CHECKMULTISIG: u8 = 0xAE;
pub const OP_CHECKMULTISIGVERIFY: u8 = 0xAF;

/// Maximum payload of a standard null-data output.
pub const MAX_NULL_DATA: usize = 80;

/// A single parsed operation: the opcode and its push payload, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Op<'a> {
    pub opcode: u8,
    pub push: Option<&'a [u8]>,
}

/// Parse a script into its operations. Returns `None` when a push runs past
/// the end of the script.
pub fn parse_ops(script: &[u8]) -> Option<Vec<Op<'_>>> {
    let mut ops = Vec::new();
    let mut i = 0;
    while i < script.len() {
        let opcode = script[i];
        i += 1;
        let push_len = match opcode {
            1..=0x4B => opcode as usize,
            OP_PUSHDATA1 => {
                let len = *script.get(i)? as usize;
                i += 1;
                len
            }
            OP_PUSHDATA2 => {
                let bytes = script.get(i..i + 2)?;
                i += 2;
                u16::from_le_bytes([bytes[0], bytes[1]]) as usize
            }
            OP_PUSHDATA4 => {
                let bytes = script.get(i..i + 4)?;
                i += 4;
                u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize
            }
            _ => {
                ops.push(Op { opcode, push: None });
                continue;
            }
        };
        let data = script.get(i..i + push_len)?;
        i += push_len;
        ops.push(Op { opcode, push: Some(data) });
    }
    Some(ops)
}

/// Whether every operation in the script is a push (or small constant).
pub fn is_push_only(script: &[u8]) -> bool {
    match parse_ops(script) {
        Some(ops) => ops.iter().all(|op| op.opcode <= OP_16),
        None => false,
    }
}

/// Count signature operations the legacy way: `CHECKSIG` counts one,
/// `CHECKMULTISIG` counts twenty. Parsing stops at a malformed push and
/// returns the count seen so far.
pub fn sig_op_count(script: &[u8]) -> usize {
    let mut count = 0;
    let mut i = 0;
    while i < script.len() {
        let opcode = script[i];
        i += 1;
        let push_len = match opcode {
            1..=0x4B => opcode as usize,
            OP_PUSHDATA1 => match script.get(i) {
                Some(&len) => {
                    i += 1;
                    len as usize
                }
                None => return count,
            },
            OP_PUSHDATA2 => match script.get(i..i + 2) {
                Some(b) => {
                    i += 2;
                    u16::from_le_bytes([b[0], b[1]]) as usize
                }
                None => return count,
            },
            OP_PUSHDATA4 => match script.get(i..i + 4) {
                Some(b) => {
                    i += 4;
                    u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as usize
                }
                None => return count,
            },
            OP_CHECKSIG | OP_CHECKSIGVERIFY => {
                count += 1;
                continue;
            }
            OP_CHECKMULTISIG | OP_CHECKMULTISIGVERIFY => {
                count += 20;
                continue;
            }
            _ => continue,
        };
        if i + push_len > script.len() {
            return count;
        }
        i += push_len;
    }
    count
}

/// Recognized output-script templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template {
    /// `<pubkey> OP_CHECKSIG`
    PubKey,
    /// `OP_DUP OP_HASH160 <20> OP_EQUALVERIFY OP_CHECKSIG`
    PubKeyHash,
    /// `OP_HASH160 <20> OP_EQUAL`
    ScriptHash,
    /// `OP_m <keys…> OP_n OP_CHECKMULTISIG`, at most three keys
    Multisig { required: u8, total: u8 },
    /// `OP_RETURN [<data>]`
    NullData,
}

fn is_key_push(op: &Op<'_>) -> bool {
    matches!(op.push, Some(data) if data.len() == 33 || data.len() == 65)
}

fn small_int(opcode: u8) -> Option<u8> {
    (OP_1..=OP_16).contains(&opcode).then(|| opcode - OP_1 + 1)
}

/// Match a public-key script against the recognized templates.
pub fn solve(script: &[u8]) -> Option<Template> {
    let ops = parse_ops(script)?;

    match ops.as_slice() {
        [key, sig] if is_key_push(key) && sig.opcode == OP_CHECKSIG => {
            return Some(Template::PubKey);
        }
        [dup, hash, push, eqv, sig]
            if dup.opcode == OP_DUP
                && hash.opcode == OP_HASH160
                && matches!(push.push, Some(d) if d.len() == 20)
                && eqv.opcode == OP_EQUALVERIFY
                && sig.opcode == OP_CHECKSIG =>
        {
            return Some(Template::PubKeyHash);
        }
        [hash, push, eq]
            if hash.opcode == OP_HASH160
                && matches!(push.push, Some(d) if d.len() == 20)
                && eq.opcode == OP_EQUAL =>
        {
            return Some(Template::ScriptHash);
        }
        [ret] if ret.opcode == OP_RETURN => return Some(Template::NullData),
        [ret, data]
            if ret.opcode == OP_RETURN
                && matches!(data.push, Some(d) if d.len() <= MAX_NULL_DATA) =>
        {
            return Some(Template::NullData);
        }
        _ => {}
    }

    // Multisig: OP_m <keys…> OP_n OP_CHECKMULTISIG
    if ops.len() >= 4 && ops[ops.len() - 1].opcode == OP_CHECKMULTISIG {
        let required = small_int(ops[0].opcode)?;
        let total = small_int(ops[ops.len() - 2].opcode)?;
        let keys = &ops[1..ops.len() - 2];
        if required >= 1
            && required <= total
            && total <= 3
            && keys.len() == total as usize
            && keys.iter().all(is_key_push)
        {
            return Some(Template::Multisig { required, total });
        }
    }

    None
}

/// Whether a transaction follows relay policy.
///
/// A non-standard transaction may still be valid inside a block; it is
/// simply not relayed or mined.
pub fn check_standard(tx: &Transaction) -> Result<(), PolicyError> {
    if tx.version < 1 || tx.version > CURRENT_TX_VERSION {
        return Err(PolicyError::Version);
    }
    if tx.serialized_size(SerMode::Full) > MAX_STANDARD_TX_SIZE {
        return Err(PolicyError::Oversized);
    }
    for input in &tx.vin {
        if input.sig_script.len() > MAX_STANDARD_SIGSCRIPT_SIZE {
            return Err(PolicyError::SigScriptSize);
        }
        if !is_push_only(&input.sig_script) {
            return Err(PolicyError::SigScriptNotPushOnly);
        }
    }
    for output in &tx.vout {
        if solve(&output.pub_key_script).is_none() {
            return Err(PolicyError::UnknownTemplate);
        }
    }
    Ok(())
}

/// Whether every input of `tx` spends a recognized output template.
///
/// `resolve` maps a prevout to the output it spends; inputs whose source
/// cannot be resolved are non-standard.
pub fn are_inputs_standard<F>(tx: &Transaction, resolve: F) -> bool
where
    F: Fn(&crate::types::OutPoint) -> Option<TxOut>,
{
    if tx.is_coinbase() {
        return true;
    }
    tx.vin.iter().all(|input| {
        resolve(&input.prevout)
            .map(|out| solve(&out.pub_key_script).is_some())
            .unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::COIN;
    use crate::hash::Hash256;
    use crate::types::{OutPoint, TxIn};

    fn p2pkh(seed: u8) -> Vec<u8> {
        let mut s = vec![OP_DUP, OP_HASH160, 20];
        s.extend_from_slice(&[seed; 20]);
        s.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);
        s
    }

    fn p2sh(seed: u8) -> Vec<u8> {
        let mut s = vec![OP_HASH160, 20];
        s.extend_from_slice(&[seed; 20]);
        s.push(OP_EQUAL);
        s
    }

    fn bare_pubkey() -> Vec<u8> {
        let mut s = vec![33];
        s.extend_from_slice(&[0x02; 33]);
        s.push(OP_CHECKSIG);
        s
    }

    fn multisig(required: u8, total: u8) -> Vec<u8> {
        let mut s = vec![OP_1 + required - 1];
        for _ in 0..total {
            s.push(33);
            s.extend_from_slice(&[0x03; 33]);
        }
        s.push(OP_1 + total - 1);
        s.push(OP_CHECKMULTISIG);
        s
    }

    // --- parsing ---

    #[test]
    fn parse_direct_push() {
        let ops = parse_ops(&[3, 0xAA, 0xBB, 0xCC]).unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].push, Some(&[0xAA, 0xBB, 0xCC][..]));
    }

    #[test]
    fn parse_pushdata1() {
        let mut script = vec![OP_PUSHDATA1, 76];
        script.extend_from_slice(&[7; 76]);
        let ops = parse_ops(&script).unwrap();
        assert_eq!(ops[0].push.unwrap().len(), 76);
    }

    #[test]
    fn parse_rejects_truncated_push() {
        assert!(parse_ops(&[5, 0xAA]).is_none());
        assert!(parse_ops(&[OP_PUSHDATA1]).is_none());
        assert!(parse_ops(&[OP_PUSHDATA2, 0xFF]).is_none());
    }

    // --- push-only ---

    #[test]
    fn push_only_accepts_pushes_and_small_ints() {
        assert!(is_push_only(&[2, 0xAA, 0xBB, OP_0, OP_1, OP_16]));
        assert!(is_push_only(&[]));
    }

    #[test]
    fn push_only_rejects_operations() {
        assert!(!is_push_only(&[OP_DUP]));
        assert!(!is_push_only(&[2, 0xAA, 0xBB, OP_CHECKSIG]));
        assert!(!is_push_only(&[5, 0xAA]));
    }

    // --- sigops ---

    #[test]
    fn sigop_counting() {
        assert_eq!(sig_op_count(&p2pkh(1)), 1);
        assert_eq!(sig_op_count(&multisig(2, 3)), 20);
        assert_eq!(sig_op_count(&[OP_CHECKSIG, OP_CHECKSIGVERIFY]), 2);
        assert_eq!(sig_op_count(&[]), 0);
    }

    #[test]
    fn sigop_count_ignores_push_payloads() {
        // A push whose payload contains the CHECKSIG byte must not count.
        let script = vec![1, OP_CHECKSIG];
        assert_eq!(sig_op_count(&script), 0);
    }

    #[test]
    fn sigop_count_stops_at_truncated_push() {
        let script = vec![OP_CHECKSIG, 10, 0xAA];
        assert_eq!(sig_op_count(&script), 1);
    }

    // --- templates ---

    #[test]
    fn solves_standard_templates() {
        assert_eq!(solve(&p2pkh(1)), Some(Template::PubKeyHash));
        assert_eq!(solve(&p2sh(1)), Some(Template::ScriptHash));
        assert_eq!(solve(&bare_pubkey()), Some(Template::PubKey));
        assert_eq!(
            solve(&multisig(2, 3)),
            Some(Template::Multisig { required: 2, total: 3 })
        );
        assert_eq!(solve(&[OP_RETURN]), Some(Template::NullData));
        assert_eq!(solve(&[OP_RETURN, 4, 1, 2, 3, 4]), Some(Template::NullData));
    }

    #[test]
    fn rejects_non_templates() {
        assert_eq!(solve(&[]), None);
        assert_eq!(solve(&[OP_DUP, OP_CHECKSIG]), None);
        // Four-key multisig is not standard.
        assert_eq!(solve(&multisig(2, 4)), None);
        // Wrong hash length.
        let mut bad = vec![OP_HASH160, 19];
        bad.extend_from_slice(&[1; 19]);
        bad.push(OP_EQUAL);
        assert_eq!(solve(&bad), None);
    }

    #[test]
    fn null_data_payload_limit() {
        let mut script = vec![OP_RETURN, OP_PUSHDATA1, 81];
        script.extend_from_slice(&[0; 81]);
        assert_eq!(solve(&script), None);
    }

    // --- standardness ---

    fn standard_tx() -> Transaction {
        let mut tx = Transaction::new(1_700_000_000);
        tx.vin.push(TxIn::new(
            OutPoint::new(Hash256([1; 32]), 0),
            vec![2, 0xAA, 0xBB],
        ));
        tx.vout.push(TxOut::new(1 * COIN, p2pkh(9)));
        tx
    }

    #[test]
    fn standard_tx_passes() {
        assert!(check_standard(&standard_tx()).is_ok());
    }

    #[test]
    fn future_version_is_not_standard() {
        let mut tx = standard_tx();
        tx.version = CURRENT_TX_VERSION + 1;
        assert_eq!(check_standard(&tx).unwrap_err(), PolicyError::Version);
    }

    #[test]
    fn oversized_sig_script_is_not_standard() {
        let mut tx = standard_tx();
        let mut script = Vec::new();
        while script.len() <= MAX_STANDARD_SIGSCRIPT_SIZE {
            script.push(75);
            script.extend_from_slice(&[0; 75]);
        }
        tx.vin[0].sig_script = script;
        assert_eq!(check_standard(&tx).unwrap_err(), PolicyError::SigScriptSize);
    }

    #[test]
    fn non_push_sig_script_is_not_standard() {
        let mut tx = standard_tx();
        tx.vin[0].sig_script = vec![OP_DUP];
        assert_eq!(
            check_standard(&tx).unwrap_err(),
            PolicyError::SigScriptNotPushOnly
        );
    }

    #[test]
    fn unknown_output_template_is_not_standard() {
        let mut tx = standard_tx();
        tx.vout[0].pub_key_script = vec![OP_DUP, OP_DUP];
        assert_eq!(
            check_standard(&tx).unwrap_err(),
            PolicyError::UnknownTemplate
        );
    }

    #[test]
    fn inputs_standard_resolution() {
        let tx = standard_tx();
        let good = |_: &OutPoint| Some(TxOut::new(2 * COIN, p2pkh(1)));
        let weird = |_: &OutPoint| Some(TxOut::new(2 * COIN, vec![OP_DUP, OP_DUP]));
        let missing = |_: &OutPoint| None;
        assert!(are_inputs_standard(&tx, good));
        assert!(!are_inputs_standard(&tx, weird));
        assert!(!are_inputs_standard(&tx, missing));
    }
}
