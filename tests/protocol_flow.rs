//! End-to-end protocol scenarios: mint, redeem, fulfill by SPV proof,
//! and watchdog escalation.

use std::sync::Arc;

use qcbtc::bitcoin::address::{bech32_encode, decode_address, ScriptType};
use qcbtc::bitcoin::header::{hash_meets_target, BlockHeader};
use qcbtc::bitcoin::merkle::{build_merkle_proof, compute_merkle_root_from_txs};
use qcbtc::bitcoin::tx::{script_pubkey_for, serialize_output_vector, TxInfo, TxOut};
use qcbtc::ledger::{BalanceError, BalanceLedger};
use qcbtc::redemption::RedemptionPolicy;
use qcbtc::watchdog::PauseAuthority;
use qcbtc::{
    CoinbaseProof, CustodianStatus, LedgerError, ProtocolParams, RedemptionError,
    RedemptionManager, RedemptionStatus, ReserveLedger, SpvVerifier, StaticRelay,
    TransactionProof, ViolationReason, WatchdogEnforcer, WatchdogError,
};

const MIN: u64 = 60;

#[derive(Default)]
struct TestBalanceLedger {
    credited: u128,
    burned: u128,
}

impl BalanceLedger for TestBalanceLedger {
    fn increase_balance(&mut self, _account: &str, token_units: u128) -> Result<(), BalanceError> {
        self.credited += token_units;
        Ok(())
    }

    fn burn(&mut self, _account: &str, token_units: u128) -> Result<(), BalanceError> {
        self.burned += token_units;
        Ok(())
    }
}

#[derive(Default)]
struct TestPauseAuthority {
    paused: Vec<String>,
}

impl PauseAuthority for TestPauseAuthority {
    fn emergency_pause_qc(&mut self, qc: &str, _reason: ViolationReason) {
        self.paused.push(qc.to_string());
    }
}

fn coinbase_tx() -> TxInfo {
    TxInfo {
        version: 1u32.to_le_bytes(),
        input_vector: vec![0x01, 0x00],
        output_vector: serialize_output_vector(&[TxOut {
            value_sats: 312_500_000,
            script_pubkey: script_pubkey_for(ScriptType::P2wpkh, &[0x77; 20]),
        }]),
        locktime: [0; 4],
    }
}

fn payment_tx(program: &[u8; 20], sats: u64) -> TxInfo {
    TxInfo {
        version: 2u32.to_le_bytes(),
        input_vector: vec![0x01, 0xaa],
        output_vector: serialize_output_vector(&[TxOut {
            value_sats: sats,
            script_pubkey: script_pubkey_for(ScriptType::P2wpkh, program),
        }]),
        locktime: [0; 4],
    }
}

/// Mine a regtest-grade block over [coinbase, tx] plus `depth - 1`
/// empty headers on top.
fn prove(tx: &TxInfo, depth: usize) -> TransactionProof {
    let hashes = [coinbase_tx().txid(), tx.txid()];
    let root = compute_merkle_root_from_txs(&hashes).unwrap();

    let mut headers = Vec::new();
    let mut prev = [0u8; 32];
    for i in 0..depth {
        let mut header = BlockHeader {
            version: 0x20000000,
            prev_block_hash: prev,
            merkle_root: if i == 0 { root } else { [i as u8; 32] },
            timestamp: 1_700_000_000 + i as u32,
            bits: 0x207fffff,
            nonce: 0,
        };
        let target = header.target();
        while !hash_meets_target(&header.block_hash(), &target) {
            header.nonce += 1;
        }
        prev = header.block_hash();
        headers.extend_from_slice(&header.to_raw());
    }

    TransactionProof {
        merkle_proof: build_merkle_proof(&hashes, 1).unwrap(),
        tx_index: 1,
        bitcoin_headers: headers,
        coinbase_proof: CoinbaseProof {
            coinbase_tx: coinbase_tx(),
            merkle_proof: build_merkle_proof(&hashes, 0).unwrap(),
        },
    }
}

#[test]
fn mint_then_redeem_scenario() {
    let mut ledger = ReserveLedger::new();
    let mut balance = TestBalanceLedger::default();

    ledger.register_custodian("qc-1", 10, 0).unwrap();
    ledger.update_backing("qc-1", 10, 0).unwrap();

    assert_eq!(ledger.mint("qc-1", "alice", 5, &mut balance).unwrap(), 5);
    assert_eq!(ledger.custodian("qc-1").unwrap().minted, 5);

    assert!(matches!(
        ledger.mint("qc-1", "alice", 6, &mut balance),
        Err(LedgerError::InsufficientBacking { .. })
    ));

    ledger.redeem("qc-1", 5).unwrap();
    assert_eq!(ledger.custodian("qc-1").unwrap().minted, 0);
    assert_eq!(ledger.total_minted(), 0);
}

#[test]
fn backing_invariant_holds_after_every_successful_mint() {
    let mut ledger = ReserveLedger::new();
    let mut balance = TestBalanceLedger::default();
    ledger.register_custodian("qc-1", 1000, 0).unwrap();
    ledger.update_backing("qc-1", 700, 0).unwrap();

    for amount in [100, 250, 350, 1] {
        match ledger.mint("qc-1", "alice", amount, &mut balance) {
            Ok(_) => {
                let record = ledger.custodian("qc-1").unwrap();
                assert!(record.backing >= record.minted);
            }
            Err(LedgerError::InsufficientBacking { .. }) => {}
            Err(e) => panic!("unexpected mint failure: {}", e),
        }
    }
    assert_eq!(ledger.total_minted(), ledger.custodian("qc-1").unwrap().minted);
}

#[test]
fn full_redemption_lifecycle_with_spv_fulfillment() {
    let params = ProtocolParams::default();
    let mut ledger = ReserveLedger::new();
    let mut balance = TestBalanceLedger::default();
    let mut mgr = RedemptionManager::new(
        params.redemption_timeout,
        params.redemption_fee_bps,
        params.dust_threshold_sats,
    );
    let spv = SpvVerifier::new(
        Arc::new(StaticRelay::new(1, 1)),
        params.proof_difficulty_factor,
    );

    ledger.register_custodian("qc-1", 1_000_000, 0).unwrap();
    ledger.update_backing("qc-1", 1_000_000, 0).unwrap();
    ledger.mint("qc-1", "alice", 100_000, &mut balance).unwrap();
    assert_eq!(balance.credited, 100_000u128 * 10_000_000_000);

    let program = [0x42u8; 20];
    let addr = bech32_encode("bc", 0, &program);
    let t0 = 1000;
    let id = mgr
        .request_redemption("qc-1", "alice", &addr, 100_000, t0, &mut ledger, &mut balance)
        .unwrap();

    // Burn happened at request time, minted released
    assert_eq!(balance.burned, 100_000u128 * 10_000_000_000);
    assert_eq!(ledger.custodian("qc-1").unwrap().minted, 0);

    // Default fee is zero, so the full amount is owed on-chain
    let expected = mgr.request(&id).unwrap().expected_payment_sats;
    assert_eq!(expected, 100_000);

    let tx = payment_tx(&program, expected);
    let proof = prove(&tx, params.proof_difficulty_factor as usize);
    mgr.record_fulfillment(&id, &tx, &proof, t0 + 3600, &spv).unwrap();
    assert_eq!(mgr.request(&id).unwrap().status, RedemptionStatus::Fulfilled);

    // Double fulfillment is blocked
    assert!(matches!(
        mgr.record_fulfillment(&id, &tx, &proof, t0 + 3700, &spv),
        Err(RedemptionError::AlreadyFulfilled)
    ));
}

#[test]
fn shallow_proof_is_rejected_then_deeper_proof_accepted() {
    let params = ProtocolParams::default();
    let mut ledger = ReserveLedger::new();
    let mut balance = TestBalanceLedger::default();
    let mut mgr = RedemptionManager::new(
        params.redemption_timeout,
        params.redemption_fee_bps,
        params.dust_threshold_sats,
    );
    let spv = SpvVerifier::new(Arc::new(StaticRelay::new(1, 1)), 6);

    ledger.register_custodian("qc-1", 1_000_000, 0).unwrap();
    ledger.update_backing("qc-1", 1_000_000, 0).unwrap();
    ledger.mint("qc-1", "alice", 50_000, &mut balance).unwrap();

    let program = [0x55u8; 20];
    let addr = bech32_encode("bc", 0, &program);
    let id = mgr
        .request_redemption("qc-1", "alice", &addr, 50_000, 1000, &mut ledger, &mut balance)
        .unwrap();

    let tx = payment_tx(&program, 50_000);

    let shallow = prove(&tx, 2);
    assert!(matches!(
        mgr.record_fulfillment(&id, &tx, &shallow, 2000, &spv),
        Err(RedemptionError::Spv(_))
    ));
    assert_eq!(mgr.request(&id).unwrap().status, RedemptionStatus::Pending);

    // Retrying later with a deeper chain is the expected recovery
    let deep = prove(&tx, 6);
    mgr.record_fulfillment(&id, &tx, &deep, 3000, &spv).unwrap();
    assert_eq!(mgr.request(&id).unwrap().status, RedemptionStatus::Fulfilled);
}

#[test]
fn watchdog_escalation_scenario() {
    let params = ProtocolParams::default();
    let mut ledger = ReserveLedger::new();
    let mut balance = TestBalanceLedger::default();
    let mut watchdog = WatchdogEnforcer::new(params.watchdog_params());
    let mut pause = TestPauseAuthority::default();

    let t0 = 1_000_000;
    ledger.register_custodian("qc-1", 100, t0).unwrap();
    ledger.update_backing("qc-1", 10, t0).unwrap();
    ledger.mint("qc-1", "alice", 10, &mut balance).unwrap();
    // Attestation drops backing to 9 against 10 minted
    ledger.update_backing("qc-1", 9, t0).unwrap();

    watchdog
        .enforce_objective_violation(&mut ledger, "qc-1", ViolationReason::InsufficientReserves, t0)
        .unwrap();
    assert_eq!(
        ledger.custodian("qc-1").unwrap().status,
        CustodianStatus::UnderReview
    );

    // Before 45 minutes the escalation is gated
    assert!(matches!(
        watchdog.check_escalation(&mut ledger, "qc-1", &mut pause, t0 + 44 * MIN),
        Err(WatchdogError::EscalationDelayNotReached { .. })
    ));
    assert!(pause.paused.is_empty());

    // After 45 minutes with the violation still present, escalate
    let late = t0 + 45 * MIN;
    ledger.update_backing("qc-1", 9, late).unwrap();
    watchdog
        .check_escalation(&mut ledger, "qc-1", &mut pause, late)
        .unwrap();
    assert_eq!(
        ledger.custodian("qc-1").unwrap().status,
        CustodianStatus::EmergencyPaused
    );
    assert_eq!(pause.paused, vec!["qc-1".to_string()]);
    assert!(watchdog.escalation_timer("qc-1").is_none());

    // A paused custodian cannot mint
    assert!(matches!(
        ledger.mint("qc-1", "alice", 1, &mut balance),
        Err(LedgerError::QcNotActive { .. })
    ));
}

#[test]
fn known_p2wpkh_address_decodes_deterministically() {
    let addr = "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4";
    let first = decode_address(addr).unwrap();
    assert_eq!(first.script_type, ScriptType::P2wpkh);
    assert_eq!(first.script_hash.len(), 20);
    assert_eq!(
        hex::encode(&first.script_hash),
        "751e76e8199196d454941c45d1b3a323f1433bd6"
    );

    let second = decode_address(addr).unwrap();
    assert_eq!(first.script_type, second.script_type);
    assert_eq!(first.script_hash, second.script_hash);
}

#[test]
fn tampered_addresses_are_rejected() {
    // Flip the final checksum character
    assert!(decode_address("bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t5").is_err());
    // Mixed case bech32
    assert!(decode_address("bc1Qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4").is_err());
    // Corrupted base58 checksum
    assert!(decode_address("1BvBMSEYstWetqTFn5Au4m4GFg7xJaNVN3").is_err());
}
