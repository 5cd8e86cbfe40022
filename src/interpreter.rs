//! Witness program script engine
//!
//! Verifies a single transaction input spending a P2WPKH or P2TR output
//! (key path or tapscript leaf). Standard policy rules are always applied:
//! low-S strict DER and compressed keys for witness v0, minimal pushes and
//! minimal IF arguments, clean stack, and rejection of OP_SUCCESS,
//! upgradable NOPs, unknown leaf versions and unknown public key types.

use bitcoin::hashes::{hash160, ripemd160, sha1, sha256, sha256d, Hash};
use bitcoin::opcodes::all::*;
use bitcoin::opcodes::Opcode;
use bitcoin::script::Instruction;
use bitcoin::sighash::SighashCache;
use bitcoin::taproot::{ControlBlock, LeafVersion, TapLeafHash};
use bitcoin::{
    EcdsaSighashType, Script, TapSighashType, Transaction, TxOut, Witness, WitnessVersion, XOnlyPublicKey,
};
use secp256k1::{ecdsa, Message, PublicKey, SECP256K1};
use thiserror::Error;

use crate::schnorr;
use crate::sighash::{signature_hash, tap_sighash_type, PrevOutputFetcher, NO_CODESEPARATOR};

pub const MAX_SCRIPT_ELEMENT_SIZE: usize = 520;
pub const MAX_STACK_SIZE: usize = 1000;

const VALIDATION_WEIGHT_PER_SIGOP_PASSED: i64 = 50;
const VALIDATION_WEIGHT_OFFSET: i64 = 50;

const ANNEX_TAG: u8 = 0x50;
const TAPROOT_CONTROL_BASE_SIZE: usize = 33;
const TAPROOT_CONTROL_NODE_SIZE: usize = 32;
const TAPROOT_CONTROL_MAX_NODE_COUNT: usize = 128;

const SEQUENCE_LOCKTIME_DISABLE_FLAG: i64 = 1 << 31;
const SEQUENCE_LOCKTIME_TYPE_FLAG: i64 = 1 << 22;
const SEQUENCE_LOCKTIME_MASK: i64 = 0x0000_ffff;
const LOCKTIME_THRESHOLD: i64 = 500_000_000;

/// Why an input failed verification
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    #[error("input index {index} out of range for {inputs} inputs")]
    InputIndexOutOfRange { index: usize, inputs: usize },
    #[error("{prevouts} previous outputs for {inputs} inputs")]
    PrevoutsMismatch { prevouts: usize, inputs: usize },
    #[error("output script is not a supported witness program")]
    UnsupportedScriptPubkey,
    #[error("witness program input must have an empty script sig")]
    WitnessMalleated,
    #[error("witness program has the wrong length")]
    WitnessProgramWrongLength,
    #[error("witness is empty")]
    WitnessProgramWitnessEmpty,
    #[error("witness does not match the witness program")]
    WitnessProgramMismatch,
    #[error("upgradable witness program")]
    DiscourageUpgradableWitnessProgram,
    #[error("upgradable taproot leaf version")]
    DiscourageUpgradableTaprootVersion,
    #[error("OP_SUCCESS opcode in tapscript")]
    DiscourageOpSuccess,
    #[error("upgradable NOP executed")]
    DiscourageUpgradableNops,
    #[error("unknown public key type")]
    DiscourageUpgradablePubkeyType,
    #[error("annex is not supported")]
    AnnexNotSupported,
    #[error("invalid taproot control block size")]
    TaprootWrongControlSize,
    #[error("script evaluated to false")]
    EvalFalse,
    #[error("stack must hold exactly one element after execution")]
    CleanStack,
    #[error("OP_RETURN executed")]
    OpReturn,
    #[error("bad opcode")]
    BadOpcode,
    #[error("OP_CHECKMULTISIG is disabled in tapscript")]
    TapscriptCheckMultisig,
    #[error("invalid stack operation")]
    InvalidStackOperation,
    #[error("invalid altstack operation")]
    InvalidAltstackOperation,
    #[error("unbalanced conditional")]
    UnbalancedConditional,
    #[error("OP_IF argument must be empty or 0x01")]
    MinimalIf,
    #[error("non-minimal data push or number encoding")]
    MinimalData,
    #[error("script number overflow")]
    NumOverflow,
    #[error("push exceeds element size limit")]
    PushSize,
    #[error("stack size limit exceeded")]
    StackSize,
    #[error("OP_VERIFY failed")]
    Verify,
    #[error("OP_EQUALVERIFY failed")]
    EqualVerify,
    #[error("OP_NUMEQUALVERIFY failed")]
    NumEqualVerify,
    #[error("OP_CHECKSIGVERIFY failed")]
    CheckSigVerify,
    #[error("non-canonical DER signature")]
    SigDer,
    #[error("signature S value is not low")]
    SigHighS,
    #[error("undefined sighash type")]
    SigHashType,
    #[error("public key is not a compressed key")]
    WitnessPubKeyType,
    #[error("invalid public key")]
    PubKeyType,
    #[error("non-empty signature failed verification")]
    NullFail,
    #[error("invalid schnorr signature size")]
    SchnorrSigSize,
    #[error("invalid schnorr sighash type")]
    SchnorrSigHashType,
    #[error("invalid schnorr signature")]
    SchnorrSig,
    #[error("tapscript validation weight exhausted")]
    TapscriptValidationWeight,
    #[error("negative locktime")]
    NegativeLockTime,
    #[error("locktime requirement not satisfied")]
    UnsatisfiedLockTime,
    #[error("sighash: {0}")]
    Sighash(String),
}

type Stack = Vec<Vec<u8>>;
type ScriptResult<T> = std::result::Result<T, ScriptError>;

/// Verify every input of `tx`
pub fn verify_tx(tx: &Transaction, prev_outputs: &PrevOutputFetcher) -> crate::error::Result<()> {
    let prevouts = prev_outputs.prevouts_for(tx)?;
    for input_index in 0..tx.input.len() {
        verify_input(tx, input_index, &prevouts)?;
    }
    Ok(())
}

/// Verify `tx.input[input_index]` against the output it spends.
///
/// `prevouts` holds the spent output of every input in input order.
pub fn verify_input(tx: &Transaction, input_index: usize, prevouts: &[TxOut]) -> ScriptResult<()> {
    if input_index >= tx.input.len() {
        return Err(ScriptError::InputIndexOutOfRange {
            index: input_index,
            inputs: tx.input.len(),
        });
    }
    if prevouts.len() != tx.input.len() {
        return Err(ScriptError::PrevoutsMismatch {
            prevouts: prevouts.len(),
            inputs: tx.input.len(),
        });
    }

    let txin = &tx.input[input_index];
    let script_pubkey = &prevouts[input_index].script_pubkey;
    if !script_pubkey.is_witness_program() {
        return Err(ScriptError::UnsupportedScriptPubkey);
    }
    let version = script_pubkey
        .witness_version()
        .ok_or(ScriptError::UnsupportedScriptPubkey)?;
    if !txin.script_sig.is_empty() {
        return Err(ScriptError::WitnessMalleated);
    }
    let program = &script_pubkey.as_bytes()[2..];

    let result = match (version, program.len()) {
        (WitnessVersion::V0, 20) => verify_p2wpkh(tx, input_index, prevouts, program, &txin.witness),
        (WitnessVersion::V0, 32) => Err(ScriptError::UnsupportedScriptPubkey),
        (WitnessVersion::V0, _) => Err(ScriptError::WitnessProgramWrongLength),
        (WitnessVersion::V1, 32) => verify_taproot(tx, input_index, prevouts, program, &txin.witness),
        _ => Err(ScriptError::DiscourageUpgradableWitnessProgram),
    };

    if let Err(e) = &result {
        tracing::debug!(input_index, error = %e, "input verification failed");
    }
    result
}

// ============================================================================
// Witness v0
// ============================================================================

fn verify_p2wpkh(
    tx: &Transaction,
    input_index: usize,
    prevouts: &[TxOut],
    program: &[u8],
    witness: &Witness,
) -> ScriptResult<()> {
    if witness.len() != 2 {
        return Err(ScriptError::WitnessProgramMismatch);
    }
    let sig = &witness[0];
    let pubkey = &witness[1];
    if sig.len() > MAX_SCRIPT_ELEMENT_SIZE || pubkey.len() > MAX_SCRIPT_ELEMENT_SIZE {
        return Err(ScriptError::PushSize);
    }

    // OP_DUP OP_HASH160 <program> OP_EQUALVERIFY OP_CHECKSIG
    if hash160::Hash::hash(pubkey).as_byte_array() != program {
        return Err(ScriptError::EqualVerify);
    }

    if sig.is_empty() {
        return Err(ScriptError::EvalFalse);
    }
    let (der, hash_type) = check_ecdsa_signature_encoding(sig)?;
    if pubkey.len() != 33 || (pubkey[0] != 0x02 && pubkey[0] != 0x03) {
        return Err(ScriptError::WitnessPubKeyType);
    }

    let prevout = &prevouts[input_index];
    let sighash = SighashCache::new(tx)
        .p2wpkh_signature_hash(input_index, &prevout.script_pubkey, prevout.value, hash_type)
        .map_err(|e| ScriptError::Sighash(e.to_string()))?;
    let msg = Message::from_digest(sighash.to_byte_array());

    let valid = PublicKey::from_slice(pubkey)
        .map(|pk| SECP256K1.verify_ecdsa(&msg, &der, &pk).is_ok())
        .unwrap_or(false);
    if !valid {
        return Err(ScriptError::NullFail);
    }
    Ok(())
}

/// Strict DER, low S and a defined hash type
fn check_ecdsa_signature_encoding(sig: &[u8]) -> ScriptResult<(ecdsa::Signature, EcdsaSighashType)> {
    if !is_valid_signature_encoding(sig) {
        return Err(ScriptError::SigDer);
    }
    let (der, hash_byte) = sig.split_at(sig.len() - 1);
    let parsed = ecdsa::Signature::from_der(der).map_err(|_| ScriptError::SigDer)?;

    let mut normalized = parsed;
    normalized.normalize_s();
    if normalized != parsed {
        return Err(ScriptError::SigHighS);
    }

    let hash_type =
        EcdsaSighashType::from_standard(hash_byte[0] as u32).map_err(|_| ScriptError::SigHashType)?;
    Ok((parsed, hash_type))
}

/// BIP-66 DER check on a signature with its trailing hash type byte
fn is_valid_signature_encoding(sig: &[u8]) -> bool {
    // 0x30 [total-length] 0x02 [R-length] [R] 0x02 [S-length] [S] [sighash]
    if sig.len() < 9 || sig.len() > 73 {
        return false;
    }
    if sig[0] != 0x30 || sig[1] as usize != sig.len() - 3 {
        return false;
    }
    let len_r = sig[3] as usize;
    if 5 + len_r >= sig.len() {
        return false;
    }
    let len_s = sig[5 + len_r] as usize;
    if len_r + len_s + 7 != sig.len() {
        return false;
    }

    if sig[2] != 0x02 || len_r == 0 || sig[4] & 0x80 != 0 {
        return false;
    }
    if len_r > 1 && sig[4] == 0x00 && sig[5] & 0x80 == 0 {
        return false;
    }

    if sig[len_r + 4] != 0x02 || len_s == 0 || sig[len_r + 6] & 0x80 != 0 {
        return false;
    }
    if len_s > 1 && sig[len_r + 6] == 0x00 && sig[len_r + 7] & 0x80 == 0 {
        return false;
    }
    true
}

// ============================================================================
// Witness v1
// ============================================================================

fn verify_taproot(
    tx: &Transaction,
    input_index: usize,
    prevouts: &[TxOut],
    program: &[u8],
    witness: &Witness,
) -> ScriptResult<()> {
    let mut stack: Stack = witness.iter().map(|e| e.to_vec()).collect();
    if stack.is_empty() {
        return Err(ScriptError::WitnessProgramWitnessEmpty);
    }
    if stack.len() >= 2 && stack.last().and_then(|e| e.first()) == Some(&ANNEX_TAG) {
        return Err(ScriptError::AnnexNotSupported);
    }

    let ctx = SigContext {
        tx,
        input_index,
        prevouts,
    };

    if stack.len() == 1 {
        return ctx.check_schnorr_signature(program, &stack[0], None);
    }

    let control = stack.pop().ok_or(ScriptError::WitnessProgramWitnessEmpty)?;
    let script_bytes = stack.pop().ok_or(ScriptError::WitnessProgramWitnessEmpty)?;
    if control.len() < TAPROOT_CONTROL_BASE_SIZE
        || control.len() > TAPROOT_CONTROL_BASE_SIZE + TAPROOT_CONTROL_NODE_SIZE * TAPROOT_CONTROL_MAX_NODE_COUNT
        || (control.len() - TAPROOT_CONTROL_BASE_SIZE) % TAPROOT_CONTROL_NODE_SIZE != 0
    {
        return Err(ScriptError::TaprootWrongControlSize);
    }

    let script = Script::from_bytes(&script_bytes);
    let output_key = XOnlyPublicKey::from_slice(program).map_err(|_| ScriptError::WitnessProgramMismatch)?;
    let control_block = ControlBlock::decode(&control).map_err(|_| ScriptError::WitnessProgramMismatch)?;
    if !control_block.verify_taproot_commitment(SECP256K1, output_key, script) {
        return Err(ScriptError::WitnessProgramMismatch);
    }
    if control_block.leaf_version != LeafVersion::TapScript {
        return Err(ScriptError::DiscourageUpgradableTaprootVersion);
    }

    let mut exec = Tapscript {
        ctx,
        leaf_hash: TapLeafHash::from_script(script, LeafVersion::TapScript),
        budget: witness.size() as i64 + VALIDATION_WEIGHT_OFFSET,
        codesep_pos: NO_CODESEPARATOR,
    };
    exec.run(script, stack)
}

struct SigContext<'a> {
    tx: &'a Transaction,
    input_index: usize,
    prevouts: &'a [TxOut],
}

impl SigContext<'_> {
    /// BIP-340 check of a key path or tapscript signature. `leaf` carries
    /// the leaf hash and code separator position for tapscript.
    fn check_schnorr_signature(
        &self,
        pubkey: &[u8],
        sig: &[u8],
        leaf: Option<(TapLeafHash, u32)>,
    ) -> ScriptResult<()> {
        let (sig_bytes, sighash_type) = match sig.len() {
            64 => (sig, TapSighashType::Default),
            65 => {
                // an explicit 0x00 must be encoded as a 64-byte signature
                if sig[64] == 0x00 {
                    return Err(ScriptError::SchnorrSigHashType);
                }
                let ty = tap_sighash_type(sig[64]).map_err(|_| ScriptError::SchnorrSigHashType)?;
                (&sig[..64], ty)
            }
            _ => return Err(ScriptError::SchnorrSigSize),
        };

        let digest = signature_hash(self.tx, self.input_index, self.prevouts, sighash_type, leaf)
            .map_err(|_| ScriptError::SchnorrSigHashType)?;

        let pk = XOnlyPublicKey::from_slice(pubkey).map_err(|_| ScriptError::SchnorrSig)?;
        let sig = secp256k1::schnorr::Signature::from_slice(sig_bytes).map_err(|_| ScriptError::SchnorrSig)?;
        if !schnorr::verify(&pk, &digest, &sig) {
            return Err(ScriptError::SchnorrSig);
        }
        Ok(())
    }
}

/// BIP-342 OP_SUCCESSx
fn is_op_success(code: u8) -> bool {
    matches!(code, 80 | 98 | 126..=129 | 131..=134 | 137..=138 | 141..=142 | 149..=153 | 187..=254)
}

struct Tapscript<'a> {
    ctx: SigContext<'a>,
    leaf_hash: TapLeafHash,
    budget: i64,
    codesep_pos: u32,
}

impl Tapscript<'_> {
    fn run(&mut self, script: &Script, mut stack: Stack) -> ScriptResult<()> {
        // OP_SUCCESS anywhere makes the script unconditionally valid, which
        // standard policy refuses
        for instruction in script.instructions() {
            match instruction.map_err(|_| ScriptError::BadOpcode)? {
                Instruction::Op(op) if is_op_success(op.to_u8()) => {
                    return Err(ScriptError::DiscourageOpSuccess)
                }
                _ => {}
            }
        }

        if stack.len() > MAX_STACK_SIZE {
            return Err(ScriptError::StackSize);
        }
        if stack.iter().any(|e| e.len() > MAX_SCRIPT_ELEMENT_SIZE) {
            return Err(ScriptError::PushSize);
        }

        self.execute(script, &mut stack)?;

        if stack.len() != 1 {
            return Err(ScriptError::CleanStack);
        }
        if !cast_to_bool(&stack[0]) {
            return Err(ScriptError::EvalFalse);
        }
        Ok(())
    }

    fn execute(&mut self, script: &Script, stack: &mut Stack) -> ScriptResult<()> {
        let mut alt: Stack = Vec::new();
        let mut exec_stack: Vec<bool> = Vec::new();

        for (pos, instruction) in script.instructions_minimal().enumerate() {
            let instruction = instruction.map_err(|e| match e {
                bitcoin::script::Error::NonMinimalPush => ScriptError::MinimalData,
                _ => ScriptError::BadOpcode,
            })?;
            let executing = exec_stack.iter().all(|b| *b);

            match instruction {
                Instruction::PushBytes(data) => {
                    if data.len() > MAX_SCRIPT_ELEMENT_SIZE {
                        return Err(ScriptError::PushSize);
                    }
                    if executing {
                        stack.push(data.as_bytes().to_vec());
                    }
                }
                Instruction::Op(op) => {
                    if op == OP_VERIF || op == OP_VERNOTIF {
                        return Err(ScriptError::BadOpcode);
                    }
                    match op {
                        OP_IF | OP_NOTIF => {
                            let mut value = false;
                            if executing {
                                let cond = pop(stack)?;
                                if cond.len() > 1 || (cond.len() == 1 && cond[0] != 1) {
                                    return Err(ScriptError::MinimalIf);
                                }
                                value = cast_to_bool(&cond);
                                if op == OP_NOTIF {
                                    value = !value;
                                }
                            }
                            exec_stack.push(value);
                        }
                        OP_ELSE => {
                            let last = exec_stack.last_mut().ok_or(ScriptError::UnbalancedConditional)?;
                            *last = !*last;
                        }
                        OP_ENDIF => {
                            exec_stack.pop().ok_or(ScriptError::UnbalancedConditional)?;
                        }
                        _ if executing => self.execute_op(op, pos as u32, stack, &mut alt)?,
                        _ => {}
                    }
                }
            }

            if stack.len() + alt.len() > MAX_STACK_SIZE {
                return Err(ScriptError::StackSize);
            }
        }

        if !exec_stack.is_empty() {
            return Err(ScriptError::UnbalancedConditional);
        }
        Ok(())
    }

    fn execute_op(&mut self, op: Opcode, pos: u32, stack: &mut Stack, alt: &mut Stack) -> ScriptResult<()> {
        let code = op.to_u8();
        match op {
            OP_PUSHNUM_NEG1 => stack.push(encode_num(-1)),
            _ if (OP_PUSHNUM_1.to_u8()..=OP_PUSHNUM_16.to_u8()).contains(&code) => {
                stack.push(encode_num((code - OP_PUSHNUM_1.to_u8() + 1) as i64))
            }

            OP_NOP => {}
            OP_NOP1 | OP_NOP4 | OP_NOP5 | OP_NOP6 | OP_NOP7 | OP_NOP8 | OP_NOP9 | OP_NOP10 => {
                return Err(ScriptError::DiscourageUpgradableNops)
            }
            OP_CLTV => self.check_lock_time(stack)?,
            OP_CSV => self.check_sequence(stack)?,
            OP_VERIFY => {
                if !cast_to_bool(&pop(stack)?) {
                    return Err(ScriptError::Verify);
                }
            }
            OP_RETURN => return Err(ScriptError::OpReturn),

            // stack
            OP_TOALTSTACK => alt.push(pop(stack)?),
            OP_FROMALTSTACK => stack.push(alt.pop().ok_or(ScriptError::InvalidAltstackOperation)?),
            OP_2DROP => {
                pop(stack)?;
                pop(stack)?;
            }
            OP_2DUP => {
                let (a, b) = (top(stack, 2)?.clone(), top(stack, 1)?.clone());
                stack.push(a);
                stack.push(b);
            }
            OP_3DUP => {
                let items = [top(stack, 3)?.clone(), top(stack, 2)?.clone(), top(stack, 1)?.clone()];
                stack.extend(items);
            }
            OP_2OVER => {
                let (a, b) = (top(stack, 4)?.clone(), top(stack, 3)?.clone());
                stack.push(a);
                stack.push(b);
            }
            OP_2ROT => {
                check_depth(stack, 6)?;
                let at = stack.len() - 6;
                let moved: Vec<_> = stack.drain(at..at + 2).collect();
                stack.extend(moved);
            }
            OP_2SWAP => {
                check_depth(stack, 4)?;
                let n = stack.len();
                stack.swap(n - 4, n - 2);
                stack.swap(n - 3, n - 1);
            }
            OP_IFDUP => {
                let v = top(stack, 1)?.clone();
                if cast_to_bool(&v) {
                    stack.push(v);
                }
            }
            OP_DEPTH => stack.push(encode_num(stack.len() as i64)),
            OP_DROP => {
                pop(stack)?;
            }
            OP_DUP => {
                let v = top(stack, 1)?.clone();
                stack.push(v);
            }
            OP_NIP => {
                check_depth(stack, 2)?;
                let at = stack.len() - 2;
                stack.remove(at);
            }
            OP_OVER => {
                let v = top(stack, 2)?.clone();
                stack.push(v);
            }
            OP_PICK | OP_ROLL => {
                let n = decode_num(&pop(stack)?, 4)?;
                if n < 0 || n as usize >= stack.len() {
                    return Err(ScriptError::InvalidStackOperation);
                }
                let at = stack.len() - 1 - n as usize;
                let v = if op == OP_ROLL { stack.remove(at) } else { stack[at].clone() };
                stack.push(v);
            }
            OP_ROT => {
                check_depth(stack, 3)?;
                let at = stack.len() - 3;
                let v = stack.remove(at);
                stack.push(v);
            }
            OP_SWAP => {
                check_depth(stack, 2)?;
                let n = stack.len();
                stack.swap(n - 2, n - 1);
            }
            OP_TUCK => {
                check_depth(stack, 2)?;
                let v = top(stack, 1)?.clone();
                let at = stack.len() - 2;
                stack.insert(at, v);
            }
            OP_SIZE => {
                let len = top(stack, 1)?.len();
                stack.push(encode_num(len as i64));
            }

            OP_EQUAL | OP_EQUALVERIFY => {
                let b = pop(stack)?;
                let a = pop(stack)?;
                let equal = a == b;
                if op == OP_EQUALVERIFY {
                    if !equal {
                        return Err(ScriptError::EqualVerify);
                    }
                } else {
                    stack.push(encode_bool(equal));
                }
            }

            // unary arithmetic
            OP_1ADD | OP_1SUB | OP_NEGATE | OP_ABS | OP_NOT | OP_0NOTEQUAL => {
                let n = decode_num(&pop(stack)?, 4)?;
                let r = match op {
                    OP_1ADD => n + 1,
                    OP_1SUB => n - 1,
                    OP_NEGATE => -n,
                    OP_ABS => n.abs(),
                    OP_NOT => (n == 0) as i64,
                    _ => (n != 0) as i64,
                };
                stack.push(encode_num(r));
            }

            // binary arithmetic
            OP_ADD | OP_SUB | OP_BOOLAND | OP_BOOLOR | OP_NUMEQUAL | OP_NUMEQUALVERIFY | OP_NUMNOTEQUAL
            | OP_LESSTHAN | OP_GREATERTHAN | OP_LESSTHANOREQUAL | OP_GREATERTHANOREQUAL | OP_MIN | OP_MAX => {
                let b = decode_num(&pop(stack)?, 4)?;
                let a = decode_num(&pop(stack)?, 4)?;
                let r = match op {
                    OP_ADD => a + b,
                    OP_SUB => a - b,
                    OP_BOOLAND => (a != 0 && b != 0) as i64,
                    OP_BOOLOR => (a != 0 || b != 0) as i64,
                    OP_NUMEQUAL | OP_NUMEQUALVERIFY => (a == b) as i64,
                    OP_NUMNOTEQUAL => (a != b) as i64,
                    OP_LESSTHAN => (a < b) as i64,
                    OP_GREATERTHAN => (a > b) as i64,
                    OP_LESSTHANOREQUAL => (a <= b) as i64,
                    OP_GREATERTHANOREQUAL => (a >= b) as i64,
                    OP_MIN => a.min(b),
                    _ => a.max(b),
                };
                if op == OP_NUMEQUALVERIFY {
                    if r == 0 {
                        return Err(ScriptError::NumEqualVerify);
                    }
                } else {
                    stack.push(encode_num(r));
                }
            }
            OP_WITHIN => {
                let max = decode_num(&pop(stack)?, 4)?;
                let min = decode_num(&pop(stack)?, 4)?;
                let x = decode_num(&pop(stack)?, 4)?;
                stack.push(encode_bool(min <= x && x < max));
            }

            // crypto
            OP_RIPEMD160 => {
                let v = pop(stack)?;
                stack.push(ripemd160::Hash::hash(&v).to_byte_array().to_vec());
            }
            OP_SHA1 => {
                let v = pop(stack)?;
                stack.push(sha1::Hash::hash(&v).to_byte_array().to_vec());
            }
            OP_SHA256 => {
                let v = pop(stack)?;
                stack.push(sha256::Hash::hash(&v).to_byte_array().to_vec());
            }
            OP_HASH160 => {
                let v = pop(stack)?;
                stack.push(hash160::Hash::hash(&v).to_byte_array().to_vec());
            }
            OP_HASH256 => {
                let v = pop(stack)?;
                stack.push(sha256d::Hash::hash(&v).to_byte_array().to_vec());
            }
            OP_CODESEPARATOR => self.codesep_pos = pos,

            OP_CHECKSIG | OP_CHECKSIGVERIFY => {
                let pubkey = pop(stack)?;
                let sig = pop(stack)?;
                let success = self.eval_checksig(&sig, &pubkey)?;
                if op == OP_CHECKSIGVERIFY {
                    if !success {
                        return Err(ScriptError::CheckSigVerify);
                    }
                } else {
                    stack.push(encode_bool(success));
                }
            }
            OP_CHECKSIGADD => {
                let pubkey = pop(stack)?;
                let n = decode_num(&pop(stack)?, 4)?;
                let sig = pop(stack)?;
                let success = self.eval_checksig(&sig, &pubkey)?;
                stack.push(encode_num(n + success as i64));
            }
            OP_CHECKMULTISIG | OP_CHECKMULTISIGVERIFY => return Err(ScriptError::TapscriptCheckMultisig),

            _ => return Err(ScriptError::BadOpcode),
        }
        Ok(())
    }

    /// BIP-342 signature opcode semantics. An empty signature is a
    /// failed check; a non-empty one must be valid.
    fn eval_checksig(&mut self, sig: &[u8], pubkey: &[u8]) -> ScriptResult<bool> {
        if !sig.is_empty() {
            self.budget -= VALIDATION_WEIGHT_PER_SIGOP_PASSED;
            if self.budget < 0 {
                return Err(ScriptError::TapscriptValidationWeight);
            }
        }
        match pubkey.len() {
            0 => Err(ScriptError::PubKeyType),
            32 => {
                if sig.is_empty() {
                    return Ok(false);
                }
                self.ctx
                    .check_schnorr_signature(pubkey, sig, Some((self.leaf_hash, self.codesep_pos)))?;
                Ok(true)
            }
            _ => Err(ScriptError::DiscourageUpgradablePubkeyType),
        }
    }

    /// BIP-65
    fn check_lock_time(&self, stack: &Stack) -> ScriptResult<()> {
        let lock = decode_num(top(stack, 1)?, 5)?;
        if lock < 0 {
            return Err(ScriptError::NegativeLockTime);
        }
        let tx_lock = self.ctx.tx.lock_time.to_consensus_u32() as i64;
        let same_type = (tx_lock < LOCKTIME_THRESHOLD) == (lock < LOCKTIME_THRESHOLD);
        if !same_type || lock > tx_lock {
            return Err(ScriptError::UnsatisfiedLockTime);
        }
        if self.ctx.tx.input[self.ctx.input_index].sequence.is_final() {
            return Err(ScriptError::UnsatisfiedLockTime);
        }
        Ok(())
    }

    /// BIP-112
    fn check_sequence(&self, stack: &Stack) -> ScriptResult<()> {
        let sequence = decode_num(top(stack, 1)?, 5)?;
        if sequence < 0 {
            return Err(ScriptError::NegativeLockTime);
        }
        if sequence & SEQUENCE_LOCKTIME_DISABLE_FLAG != 0 {
            return Ok(());
        }

        if (self.ctx.tx.version.0 as u32) < 2 {
            return Err(ScriptError::UnsatisfiedLockTime);
        }
        let tx_sequence = self.ctx.tx.input[self.ctx.input_index].sequence.0 as i64;
        if tx_sequence & SEQUENCE_LOCKTIME_DISABLE_FLAG != 0 {
            return Err(ScriptError::UnsatisfiedLockTime);
        }

        let mask = SEQUENCE_LOCKTIME_TYPE_FLAG | SEQUENCE_LOCKTIME_MASK;
        let tx_masked = tx_sequence & mask;
        let masked = sequence & mask;
        let same_type = (tx_masked < SEQUENCE_LOCKTIME_TYPE_FLAG) == (masked < SEQUENCE_LOCKTIME_TYPE_FLAG);
        if !same_type || masked > tx_masked {
            return Err(ScriptError::UnsatisfiedLockTime);
        }
        Ok(())
    }
}

// ============================================================================
// Stack helpers
// ============================================================================

fn pop(stack: &mut Stack) -> ScriptResult<Vec<u8>> {
    stack.pop().ok_or(ScriptError::InvalidStackOperation)
}

/// `n`-th element from the top, 1-based
fn top(stack: &Stack, n: usize) -> ScriptResult<&Vec<u8>> {
    check_depth(stack, n)?;
    Ok(&stack[stack.len() - n])
}

fn check_depth(stack: &Stack, n: usize) -> ScriptResult<()> {
    if stack.len() < n {
        return Err(ScriptError::InvalidStackOperation);
    }
    Ok(())
}

fn cast_to_bool(v: &[u8]) -> bool {
    for (i, b) in v.iter().enumerate() {
        if *b != 0 {
            // negative zero
            return !(i == v.len() - 1 && *b == 0x80);
        }
    }
    false
}

fn encode_bool(b: bool) -> Vec<u8> {
    if b {
        vec![1]
    } else {
        Vec::new()
    }
}

/// Minimally encoded little-endian sign-magnitude script number
fn decode_num(bytes: &[u8], max_len: usize) -> ScriptResult<i64> {
    if bytes.len() > max_len {
        return Err(ScriptError::NumOverflow);
    }
    let Some(&last) = bytes.last() else {
        return Ok(0);
    };
    if last & 0x7f == 0 && (bytes.len() == 1 || bytes[bytes.len() - 2] & 0x80 == 0) {
        return Err(ScriptError::MinimalData);
    }

    let mut result: i64 = 0;
    for (i, b) in bytes.iter().enumerate() {
        result |= (*b as i64) << (8 * i);
    }
    if last & 0x80 != 0 {
        result &= !(0x80i64 << (8 * (bytes.len() - 1)));
        return Ok(-result);
    }
    Ok(result)
}

fn encode_num(n: i64) -> Vec<u8> {
    if n == 0 {
        return Vec::new();
    }
    let negative = n < 0;
    let mut abs = n.unsigned_abs();
    let mut out = Vec::with_capacity(9);
    while abs > 0 {
        out.push((abs & 0xff) as u8);
        abs >>= 8;
    }
    let last = out.len() - 1;
    if out[last] & 0x80 != 0 {
        out.push(if negative { 0x80 } else { 0x00 });
    } else if negative {
        out[last] |= 0x80;
    }
    out
}
