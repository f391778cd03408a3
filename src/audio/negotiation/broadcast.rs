// Broadcast negotiation over the element chain
//
// A request is broadcast to every element in pipeline order. Elements may
// amend it in place; the amended request is visible to the elements after
// the amender in the same round and is queued for one fresh full round.
// Rounds are bounded, and a field may only ever be amended to one value.
// An aborted negotiation puts every element back on the configuration it
// had when the negotiation began.

use std::collections::{HashMap, VecDeque};
use tracing::{debug, info, warn};

use super::request::{FieldChange, SettingsField, SettingsRequest};
use crate::audio::elements::{ElementId, FormatSide, PipelineElement};
use crate::audio::errors::NegotiationError;
use crate::audio::types::StageConfig;
use crate::negotiation_trace;

/// Changes one element made to a request during one round
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Amendment {
    pub round: u32,
    pub element: ElementId,
    pub element_name: String,
    pub changes: Vec<FieldChange>,
}

/// An element that could not adopt a request; its configuration is unchanged
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementFailure {
    pub round: u32,
    pub element: ElementId,
    pub element_name: String,
    pub error: String,
}

/// Result of a completed negotiation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiationOutcome {
    pub rounds: u32,
    pub amendments: Vec<Amendment>,
    pub failures: Vec<ElementFailure>,
    /// The request as broadcast in the final round
    pub settled: SettingsRequest,
}

impl NegotiationOutcome {
    pub fn rebroadcasts(&self) -> u32 {
        self.rounds.saturating_sub(1)
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

struct LedgerEntry {
    element_name: String,
    value: u32,
}

/// Work-queue driven negotiation for one `request_settings` call
pub struct Negotiator {
    max_rounds: u32,
    queue: VecDeque<SettingsRequest>,
    ledger: HashMap<SettingsField, LedgerEntry>,
    amendments: Vec<Amendment>,
    failures: Vec<ElementFailure>,
}

impl Negotiator {
    pub fn new(max_rounds: u32) -> Self {
        Self {
            max_rounds,
            queue: VecDeque::new(),
            ledger: HashMap::new(),
            amendments: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Broadcast `request` until no element amends it.
    ///
    /// `elements` is the pipeline arena in source-to-sink order; an
    /// element's index is its id.
    pub async fn run(
        self,
        elements: &mut [Box<dyn PipelineElement>],
        request: SettingsRequest,
    ) -> Result<NegotiationOutcome, NegotiationError> {
        match request.requested_by.and_then(|id| elements.get(id.0)) {
            Some(origin) => info!(
                "📨 NEGOTIATION: request from '{}': {}",
                origin.name(),
                request
            ),
            None => info!(
                "📨 NEGOTIATION: request has no originating element: {}",
                request
            ),
        }

        let snapshot: Vec<StageConfig> = elements.iter().map(|e| e.stage_config()).collect();
        match self.broadcast_until_settled(elements, request).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                warn!("⚠️ NEGOTIATION: aborted ({}), restoring previous settings", e);
                Self::roll_back(elements, &snapshot).await;
                Err(e)
            }
        }
    }

    async fn broadcast_until_settled(
        mut self,
        elements: &mut [Box<dyn PipelineElement>],
        request: SettingsRequest,
    ) -> Result<NegotiationOutcome, NegotiationError> {
        self.queue.push_back(request);
        let mut rounds = 0;
        let mut settled = request;

        while let Some(mut current) = self.queue.pop_front() {
            rounds += 1;
            if rounds > self.max_rounds {
                warn!(
                    "⚠️ NEGOTIATION: no convergence after {} rounds, aborting",
                    self.max_rounds
                );
                return Err(NegotiationError::RoundLimitExceeded {
                    rounds: self.max_rounds,
                });
            }

            let amended = self.broadcast_round(rounds, elements, &mut current).await?;
            settled = current;

            if amended {
                debug!(
                    "🔁 NEGOTIATION: round {} amended request, re-broadcasting: {}",
                    rounds, current
                );
                self.queue.push_back(current);
            }
        }

        info!(
            "✅ NEGOTIATION: settled after {} round(s) with {} amendment(s): {}",
            rounds,
            self.amendments.len(),
            settled
        );

        Ok(NegotiationOutcome {
            rounds,
            amendments: self.amendments,
            failures: self.failures,
            settled,
        })
    }

    /// Re-apply the configurations captured before the first round.
    /// Elements that cannot be restored are logged and skipped.
    async fn roll_back(elements: &mut [Box<dyn PipelineElement>], snapshot: &[StageConfig]) {
        for (element, previous) in elements.iter_mut().zip(snapshot) {
            if element.stage_config() == *previous {
                continue;
            }
            match element.restore_stage_config(previous).await {
                Ok(()) => debug!(
                    "NEGOTIATION: '{}' restored to {}",
                    element.name(),
                    previous
                ),
                Err(e) => warn!(
                    "⚠️ NEGOTIATION: '{}' could not be restored to {}: {}",
                    element.name(),
                    previous,
                    e
                ),
            }
        }
    }

    async fn broadcast_round(
        &mut self,
        round: u32,
        elements: &mut [Box<dyn PipelineElement>],
        current: &mut SettingsRequest,
    ) -> Result<bool, NegotiationError> {
        let mut side = FormatSide::Source;
        let mut amended = false;

        for (index, element) in elements.iter_mut().enumerate() {
            let id = ElementId(index);
            let before = *current;

            negotiation_trace!(
                "NEGOTIATION: round {} -> '{}' ({:?} side): {}",
                round,
                element.name(),
                side,
                current
            );

            if let Err(e) = element.on_settings_request(current, side).await {
                if e.aborts_negotiation() {
                    return Err(e.into());
                }
                warn!(
                    "⚠️ NEGOTIATION: '{}' kept its previous settings: {}",
                    element.name(),
                    e
                );
                self.failures.push(ElementFailure {
                    round,
                    element: id,
                    element_name: element.name().to_string(),
                    error: e.to_string(),
                });
                *current = before;
            }

            let changes = current.changes_from(&before);
            if !changes.is_empty() {
                self.record(element.name(), &changes)?;
                current.requested_by = Some(id);
                info!(
                    "✏️ NEGOTIATION: '{}' amended request: {}",
                    element.name(),
                    current
                );
                self.amendments.push(Amendment {
                    round,
                    element: id,
                    element_name: element.name().to_string(),
                    changes,
                });
                amended = true;
            }

            if element.converts_format() {
                side = FormatSide::Final;
            }
        }

        Ok(amended)
    }

    /// Amendments may only make a field more specific, and each field may
    /// only ever be pinned to one value
    fn record(&mut self, element_name: &str, changes: &[FieldChange]) -> Result<(), NegotiationError> {
        for change in changes {
            let Some(value) = change.after else {
                return Err(NegotiationError::InvalidAmendment {
                    element: element_name.to_string(),
                    field: change.field,
                });
            };

            match self.ledger.get(&change.field) {
                Some(entry) if entry.value != value => {
                    return Err(NegotiationError::Conflict {
                        field: change.field,
                        first: entry.element_name.clone(),
                        first_value: entry.value,
                        second: element_name.to_string(),
                        second_value: value,
                    });
                }
                Some(_) => {}
                None => {
                    self.ledger.insert(
                        change.field,
                        LedgerEntry {
                            element_name: element_name.to_string(),
                            value,
                        },
                    );
                }
            }
        }
        Ok(())
    }
}
