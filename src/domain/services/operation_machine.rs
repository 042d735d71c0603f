//! Operation State Machine
//!
//! Pure reducer driving a vault operation from idle through selection,
//! spell building, proving, signing and broadcast. Every function takes the
//! current context and returns a new one; nothing here performs I/O.
//!
//! ```text
//! Idle ─start─> Selecting ─ready─> Ready ─confirm─> Building ─spell─> Proving
//!                  │                                                   │
//!                  ├─all_reserved─> Waiting                  handoff   v
//!                  └─need_split / insufficient / no_utxos─> Error    Signing
//!                                                                      │
//!                                         Success <─result─ Broadcasting
//! ```
//!
//! A failure in any active state lands in `Waiting` when it clears with time
//! (burned or reserved UTXOs) and in `Error` otherwise. Triggers that are not
//! valid for the current state are logged and leave the context unchanged.

use serde::{Deserialize, Serialize};

use super::error_classifier::parse_error_type;
use super::utxo_selector::UtxoPairResult;
use crate::domain::errors::ErrorType;
use crate::domain::models::{
    OperationRequest, OperationResult, SelectedUtxos, SpellContext, TransactionPair, UtxoRecord,
    VaultState,
};

pub const PROGRESS_SELECTING: u8 = 10;
pub const PROGRESS_READY: u8 = 20;
pub const PROGRESS_BUILDING: u8 = 30;
pub const PROGRESS_PROVING: u8 = 40;
pub const PROGRESS_SIGNING: u8 = 80;
pub const PROGRESS_BROADCASTING: u8 = 90;
pub const PROGRESS_DONE: u8 = 100;

/// Data carried by each state. Fields only exist where they are valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum OperationPhase {
    Idle,
    Selecting {
        request: OperationRequest,
    },
    Ready {
        request: OperationRequest,
        selection: SelectedUtxos,
    },
    Building {
        request: OperationRequest,
        selection: SelectedUtxos,
    },
    Proving {
        request: OperationRequest,
        selection: SelectedUtxos,
        spell: SpellContext,
    },
    Signing {
        request: OperationRequest,
        selection: SelectedUtxos,
        spell: SpellContext,
        proved: TransactionPair,
    },
    Broadcasting {
        request: OperationRequest,
        selection: SelectedUtxos,
        spell: SpellContext,
        signed: TransactionPair,
    },
    Success {
        request: OperationRequest,
        selection: SelectedUtxos,
        result: OperationResult,
    },
    /// Recoverable by waiting for reservations to expire
    Waiting {
        error: String,
        error_type: ErrorType,
        next_available_at: Option<i64>,
    },
    /// Recoverable by user action
    Error { error: String, error_type: ErrorType },
}

/// Context owned by the caller and threaded through every transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationContext {
    pub phase: OperationPhase,
    /// Percentage in [0, 100]
    pub progress: u8,
    pub status_message: String,
}

impl Default for OperationContext {
    fn default() -> Self {
        create_initial_context()
    }
}

impl OperationContext {
    pub fn state(&self) -> VaultState {
        match &self.phase {
            OperationPhase::Idle => VaultState::Idle,
            OperationPhase::Selecting { .. } => VaultState::Selecting,
            OperationPhase::Ready { .. } => VaultState::Ready,
            OperationPhase::Building { .. } => VaultState::Building,
            OperationPhase::Proving { .. } => VaultState::Proving,
            OperationPhase::Signing { .. } => VaultState::Signing,
            OperationPhase::Broadcasting { .. } => VaultState::Broadcasting,
            OperationPhase::Success { .. } => VaultState::Success,
            OperationPhase::Waiting { .. } => VaultState::Waiting,
            OperationPhase::Error { .. } => VaultState::Error,
        }
    }

    pub fn request(&self) -> Option<&OperationRequest> {
        match &self.phase {
            OperationPhase::Selecting { request }
            | OperationPhase::Ready { request, .. }
            | OperationPhase::Building { request, .. }
            | OperationPhase::Proving { request, .. }
            | OperationPhase::Signing { request, .. }
            | OperationPhase::Broadcasting { request, .. }
            | OperationPhase::Success { request, .. } => Some(request),
            _ => None,
        }
    }

    pub fn selection(&self) -> Option<&SelectedUtxos> {
        match &self.phase {
            OperationPhase::Ready { selection, .. }
            | OperationPhase::Building { selection, .. }
            | OperationPhase::Proving { selection, .. }
            | OperationPhase::Signing { selection, .. }
            | OperationPhase::Broadcasting { selection, .. }
            | OperationPhase::Success { selection, .. } => Some(selection),
            _ => None,
        }
    }

    pub fn collateral_utxo(&self) -> Option<&UtxoRecord> {
        self.selection().map(|s| &s.collateral)
    }

    pub fn fee_utxo(&self) -> Option<&UtxoRecord> {
        self.selection().map(|s| &s.fee)
    }

    pub fn spell(&self) -> Option<&SpellContext> {
        match &self.phase {
            OperationPhase::Proving { spell, .. }
            | OperationPhase::Signing { spell, .. }
            | OperationPhase::Broadcasting { spell, .. } => Some(spell),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.phase {
            OperationPhase::Waiting { error, .. } | OperationPhase::Error { error, .. } => {
                Some(error)
            }
            _ => None,
        }
    }

    pub fn error_type(&self) -> Option<ErrorType> {
        match &self.phase {
            OperationPhase::Waiting { error_type, .. }
            | OperationPhase::Error { error_type, .. } => Some(*error_type),
            _ => None,
        }
    }

    pub fn next_available_at(&self) -> Option<i64> {
        match &self.phase {
            OperationPhase::Waiting {
                next_available_at, ..
            } => *next_available_at,
            _ => None,
        }
    }

    pub fn result(&self) -> Option<&OperationResult> {
        match &self.phase {
            OperationPhase::Success { result, .. } => Some(result),
            _ => None,
        }
    }

    fn with(phase: OperationPhase, progress: u8, status_message: impl Into<String>) -> Self {
        Self {
            phase,
            progress: progress.min(PROGRESS_DONE),
            status_message: status_message.into(),
        }
    }
}

/// Every trigger the machine understands
#[derive(Debug, Clone, PartialEq)]
pub enum OperationEvent {
    Start(OperationRequest),
    SelectionResolved(UtxoPairResult),
    Confirm,
    SpellBuilt(SpellContext),
    ProvingProgress(String),
    ProofReady(TransactionPair),
    Signed(TransactionPair),
    Broadcasted(OperationResult),
    Failed {
        message: String,
        next_available_at: Option<i64>,
    },
    Reset,
}

impl OperationEvent {
    pub fn name(&self) -> &'static str {
        match self {
            OperationEvent::Start(_) => "start",
            OperationEvent::SelectionResolved(_) => "selection_resolved",
            OperationEvent::Confirm => "confirm",
            OperationEvent::SpellBuilt(_) => "spell_built",
            OperationEvent::ProvingProgress(_) => "proving_progress",
            OperationEvent::ProofReady(_) => "proof_ready",
            OperationEvent::Signed(_) => "signed",
            OperationEvent::Broadcasted(_) => "broadcasted",
            OperationEvent::Failed { .. } => "failed",
            OperationEvent::Reset => "reset",
        }
    }
}

/// Apply any event. Total: unknown combinations are logged no-ops.
pub fn transition(ctx: &OperationContext, event: OperationEvent) -> OperationContext {
    match event {
        OperationEvent::Start(request) => start_operation(ctx, request),
        OperationEvent::SelectionResolved(result) => handle_selection_result(ctx, &result),
        OperationEvent::Confirm => confirm(ctx),
        OperationEvent::SpellBuilt(spell) => spell_built(ctx, spell),
        OperationEvent::ProvingProgress(message) => update_proving_progress(ctx, &message),
        OperationEvent::ProofReady(proved) => start_signing(ctx, proved),
        OperationEvent::Signed(signed) => start_broadcasting(ctx, signed),
        OperationEvent::Broadcasted(result) => handle_success(ctx, result),
        OperationEvent::Failed {
            message,
            next_available_at,
        } => handle_error(ctx, &message, next_available_at),
        OperationEvent::Reset => reset(ctx),
    }
}

pub fn create_initial_context() -> OperationContext {
    OperationContext::with(OperationPhase::Idle, 0, "")
}

pub fn start_operation(ctx: &OperationContext, request: OperationRequest) -> OperationContext {
    if !can_start_operation(ctx) {
        return rejected(ctx, "start");
    }
    OperationContext::with(
        OperationPhase::Selecting { request },
        PROGRESS_SELECTING,
        "Selecting UTXOs...",
    )
}

pub fn handle_selection_result(ctx: &OperationContext, result: &UtxoPairResult) -> OperationContext {
    let request = match &ctx.phase {
        OperationPhase::Selecting { request } => request.clone(),
        _ => return rejected(ctx, "selection_resolved"),
    };

    let message = result.message();
    match result {
        UtxoPairResult::Ready { collateral, fee } => OperationContext::with(
            OperationPhase::Ready {
                request,
                selection: SelectedUtxos {
                    collateral: collateral.clone(),
                    fee: fee.clone(),
                },
            },
            PROGRESS_READY,
            message,
        ),
        UtxoPairResult::AllReserved {
            next_available_at, ..
        } => OperationContext::with(
            OperationPhase::Waiting {
                error: message.clone(),
                error_type: ErrorType::AllReserved,
                next_available_at: Some(*next_available_at),
            },
            0,
            message,
        ),
        other => {
            // Every non-ready status maps to an error type
            let error_type = other.status().error_type().unwrap_or(ErrorType::Unknown);
            OperationContext::with(
                OperationPhase::Error {
                    error: message.clone(),
                    error_type,
                },
                0,
                message,
            )
        }
    }
}

/// User confirmed the selected UTXOs. Only legal from `Ready`.
pub fn confirm(ctx: &OperationContext) -> OperationContext {
    match &ctx.phase {
        OperationPhase::Ready { request, selection } => OperationContext::with(
            OperationPhase::Building {
                request: request.clone(),
                selection: selection.clone(),
            },
            PROGRESS_BUILDING,
            "Building spell...",
        ),
        _ => rejected(ctx, "confirm"),
    }
}

pub fn spell_built(ctx: &OperationContext, spell: SpellContext) -> OperationContext {
    match &ctx.phase {
        OperationPhase::Building { request, selection } => OperationContext::with(
            OperationPhase::Proving {
                request: request.clone(),
                selection: selection.clone(),
                spell,
            },
            PROGRESS_PROVING,
            "Generating proof. This can take a few minutes...",
        ),
        _ => rejected(ctx, "spell_built"),
    }
}

/// Status update while the prover works. Only the message changes.
pub fn update_proving_progress(ctx: &OperationContext, message: &str) -> OperationContext {
    match &ctx.phase {
        OperationPhase::Proving { .. } => {
            OperationContext::with(ctx.phase.clone(), ctx.progress, message)
        }
        _ => rejected(ctx, "proving_progress"),
    }
}

pub fn start_signing(ctx: &OperationContext, proved: TransactionPair) -> OperationContext {
    match &ctx.phase {
        OperationPhase::Proving {
            request,
            selection,
            spell,
        } => OperationContext::with(
            OperationPhase::Signing {
                request: request.clone(),
                selection: selection.clone(),
                spell: spell.clone(),
                proved,
            },
            PROGRESS_SIGNING,
            "Waiting for wallet signature...",
        ),
        _ => rejected(ctx, "proof_ready"),
    }
}

pub fn start_broadcasting(ctx: &OperationContext, signed: TransactionPair) -> OperationContext {
    match &ctx.phase {
        OperationPhase::Signing {
            request,
            selection,
            spell,
            ..
        } => OperationContext::with(
            OperationPhase::Broadcasting {
                request: request.clone(),
                selection: selection.clone(),
                spell: spell.clone(),
                signed,
            },
            PROGRESS_BROADCASTING,
            "Broadcasting transactions...",
        ),
        _ => rejected(ctx, "signed"),
    }
}

pub fn handle_success(ctx: &OperationContext, result: OperationResult) -> OperationContext {
    match &ctx.phase {
        OperationPhase::Broadcasting {
            request, selection, ..
        } => {
            let message = format!("Operation broadcast: {}", result.spell_txid);
            OperationContext::with(
                OperationPhase::Success {
                    request: request.clone(),
                    selection: selection.clone(),
                    result,
                },
                PROGRESS_DONE,
                message,
            )
        }
        _ => rejected(ctx, "broadcasted"),
    }
}

/// Route a failure message. Burned and reserved UTXOs wait; everything else
/// needs the user.
pub fn handle_error(
    ctx: &OperationContext,
    message: &str,
    next_available_at: Option<i64>,
) -> OperationContext {
    if !is_active(ctx.state()) {
        return rejected(ctx, "failed");
    }

    let error_type = parse_error_type(message);
    let phase = if error_type.is_time_recoverable() {
        OperationPhase::Waiting {
            error: message.to_string(),
            error_type,
            next_available_at,
        }
    } else {
        OperationPhase::Error {
            error: message.to_string(),
            error_type,
        }
    };
    OperationContext::with(phase, 0, message)
}

/// Back to a fresh idle context, from any state
pub fn reset(_ctx: &OperationContext) -> OperationContext {
    create_initial_context()
}

pub fn can_start_operation(ctx: &OperationContext) -> bool {
    matches!(
        ctx.state(),
        VaultState::Idle | VaultState::Error | VaultState::Waiting
    )
}

pub fn can_confirm(ctx: &OperationContext) -> bool {
    ctx.state() == VaultState::Ready
}

pub fn is_loading(ctx: &OperationContext) -> bool {
    matches!(
        ctx.state(),
        VaultState::Selecting
            | VaultState::Building
            | VaultState::Proving
            | VaultState::Signing
            | VaultState::Broadcasting
    )
}

pub fn is_button_disabled(ctx: &OperationContext) -> bool {
    is_loading(ctx)
}

pub fn get_action_button_text(ctx: &OperationContext) -> &'static str {
    match ctx.state() {
        VaultState::Idle => "Select UTXOs",
        VaultState::Selecting => "Selecting UTXOs...",
        VaultState::Ready => "Confirm & Prove",
        VaultState::Building => "Building Spell...",
        VaultState::Proving => "Generating Proof...",
        VaultState::Signing => "Sign in Wallet...",
        VaultState::Broadcasting => "Broadcasting...",
        VaultState::Success => "Done",
        VaultState::Waiting => "Waiting for UTXOs",
        VaultState::Error => "Retry",
    }
}

/// Milliseconds until a waiting operation can retry, for countdown display
pub fn waiting_remaining_ms(ctx: &OperationContext, now_ms: i64) -> Option<i64> {
    ctx.next_available_at().map(|at| (at - now_ms).max(0))
}

fn is_active(state: VaultState) -> bool {
    matches!(
        state,
        VaultState::Selecting
            | VaultState::Ready
            | VaultState::Building
            | VaultState::Proving
            | VaultState::Signing
            | VaultState::Broadcasting
    )
}

fn rejected(ctx: &OperationContext, trigger: &str) -> OperationContext {
    log::warn!(
        "Ignoring '{}' in state '{}': not a valid transition",
        trigger,
        ctx.state()
    );
    ctx.clone()
}
