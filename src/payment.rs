//! Payment matching against parsed Bitcoin transactions.
//!
//! Two checks: an OP_RETURN challenge scan that binds a transaction to a
//! specific request, and an output-sum check that a redemption payout
//! actually pays the redeemer's address in full.

use tracing::debug;

use crate::bitcoin::address::{decode_address, DecodedAddress};
use crate::bitcoin::tx::TxInfo;

/// Scan a transaction's outputs for an OP_RETURN carrying exactly the
/// expected 32-byte challenge.
///
/// Only single-push OP_RETURN payloads are considered; outputs that fail
/// to parse as such are skipped, not rejected, since unrelated outputs
/// routinely coexist in the same transaction.
pub fn find_challenge_in_op_return(tx: &TxInfo, challenge: &[u8; 32]) -> bool {
    let outputs = match tx.outputs() {
        Ok(outputs) => outputs,
        Err(_) => return false,
    };

    outputs
        .iter()
        .filter_map(|out| out.op_return_payload())
        .any(|payload| payload == challenge)
}

/// Check that a transaction pays at least `expected_sats` to
/// `btc_address`.
///
/// All outputs whose script matches the decoded address are summed, so a
/// payout split across several outputs to the same address still counts.
/// Returns `false` for an undecodable address or unparseable outputs.
pub fn verify_redemption_payment(btc_address: &str, expected_sats: u64, tx: &TxInfo) -> bool {
    let DecodedAddress {
        script_type,
        script_hash,
    } = match decode_address(btc_address) {
        Ok(decoded) => decoded,
        Err(e) => {
            debug!(address = btc_address, error = %e, "undecodable payout address");
            return false;
        }
    };

    let outputs = match tx.outputs() {
        Ok(outputs) => outputs,
        Err(_) => return false,
    };

    let mut paid: u64 = 0;
    for out in &outputs {
        if let Some((out_type, out_hash)) = out.script_hash() {
            if out_type == script_type && out_hash == script_hash.as_slice() {
                paid = paid.saturating_add(out.value_sats);
            }
        }
    }

    debug!(
        address = btc_address,
        paid, expected_sats, "redemption payment check"
    );
    paid >= expected_sats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitcoin::address::{bech32_encode, ScriptType};
    use crate::bitcoin::tx::{script_pubkey_for, serialize_output_vector, TxOut};

    fn tx_with_outputs(outputs: &[TxOut]) -> TxInfo {
        TxInfo {
            version: 2u32.to_le_bytes(),
            input_vector: vec![0x00],
            output_vector: serialize_output_vector(outputs),
            locktime: [0; 4],
        }
    }

    fn op_return_output(payload: &[u8]) -> TxOut {
        let mut script = vec![0x6a, payload.len() as u8];
        script.extend_from_slice(payload);
        TxOut {
            value_sats: 0,
            script_pubkey: script,
        }
    }

    #[test]
    fn test_challenge_found() {
        let challenge = [0xab; 32];
        let tx = tx_with_outputs(&[
            TxOut {
                value_sats: 1000,
                script_pubkey: script_pubkey_for(ScriptType::P2wpkh, &[0x11; 20]),
            },
            op_return_output(&challenge),
        ]);
        assert!(find_challenge_in_op_return(&tx, &challenge));
    }

    #[test]
    fn test_wrong_challenge_not_found() {
        let tx = tx_with_outputs(&[op_return_output(&[0xab; 32])]);
        assert!(!find_challenge_in_op_return(&tx, &[0xcd; 32]));
    }

    #[test]
    fn test_short_op_return_payload_not_matched() {
        // 31-byte payload never equals a 32-byte challenge
        let tx = tx_with_outputs(&[op_return_output(&[0xab; 31])]);
        assert!(!find_challenge_in_op_return(&tx, &[0xab; 32]));
    }

    #[test]
    fn test_no_op_return_outputs() {
        let tx = tx_with_outputs(&[TxOut {
            value_sats: 1000,
            script_pubkey: script_pubkey_for(ScriptType::P2wpkh, &[0x11; 20]),
        }]);
        assert!(!find_challenge_in_op_return(&tx, &[0xab; 32]));
    }

    fn test_address(program: &[u8; 20]) -> String {
        bech32_encode("bc", 0, program)
    }

    #[test]
    fn test_exact_payment_accepted() {
        let program = [0x42; 20];
        let addr = test_address(&program);
        let tx = tx_with_outputs(&[TxOut {
            value_sats: 50_000,
            script_pubkey: script_pubkey_for(ScriptType::P2wpkh, &program),
        }]);
        assert!(verify_redemption_payment(&addr, 50_000, &tx));
    }

    #[test]
    fn test_underpayment_rejected() {
        let program = [0x42; 20];
        let addr = test_address(&program);
        let tx = tx_with_outputs(&[TxOut {
            value_sats: 49_999,
            script_pubkey: script_pubkey_for(ScriptType::P2wpkh, &program),
        }]);
        assert!(!verify_redemption_payment(&addr, 50_000, &tx));
    }

    #[test]
    fn test_split_payment_summed() {
        let program = [0x42; 20];
        let addr = test_address(&program);
        let tx = tx_with_outputs(&[
            TxOut {
                value_sats: 30_000,
                script_pubkey: script_pubkey_for(ScriptType::P2wpkh, &program),
            },
            TxOut {
                value_sats: 25_000,
                script_pubkey: script_pubkey_for(ScriptType::P2wpkh, &program),
            },
        ]);
        assert!(verify_redemption_payment(&addr, 50_000, &tx));
    }

    #[test]
    fn test_payment_to_other_address_ignored() {
        let program = [0x42; 20];
        let addr = test_address(&program);
        let tx = tx_with_outputs(&[TxOut {
            value_sats: 100_000,
            script_pubkey: script_pubkey_for(ScriptType::P2wpkh, &[0x43; 20]),
        }]);
        assert!(!verify_redemption_payment(&addr, 100_000, &tx));
    }

    #[test]
    fn test_matching_hash_wrong_script_type_ignored() {
        // Same 20-byte hash behind a P2PKH script must not satisfy a
        // P2WPKH address
        let program = [0x42; 20];
        let addr = test_address(&program);
        let tx = tx_with_outputs(&[TxOut {
            value_sats: 100_000,
            script_pubkey: script_pubkey_for(ScriptType::P2pkh, &program),
        }]);
        assert!(!verify_redemption_payment(&addr, 100_000, &tx));
    }

    #[test]
    fn test_undecodable_address_rejected() {
        let tx = tx_with_outputs(&[TxOut {
            value_sats: 100_000,
            script_pubkey: script_pubkey_for(ScriptType::P2wpkh, &[0x42; 20]),
        }]);
        assert!(!verify_redemption_payment("not-an-address", 1, &tx));
    }
}
