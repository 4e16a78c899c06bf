use log::warn;
use rand::Rng;

use crate::gate::error::GateError;
use crate::gate::ledger::StepLedger;
use crate::gate::token::SessionToken;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenCheck {
    Valid,
    Replaced,
}

/// Last line of checks before the destination link is handed out.
pub struct CompletionValidator<'a> {
    pub secret: &'a str,
    pub min_spread_ms: i64,
}

impl<'a> CompletionValidator<'a> {
    pub fn validate<R: Rng + ?Sized>(
        &self,
        ledger: &StepLedger,
        token: &mut SessionToken,
        now_ms: i64,
        rng: &mut R,
    ) -> Result<TokenCheck, GateError> {
        if !ledger.all_verified() {
            return Err(GateError::IncompleteGate {
                completed: ledger.completed_count(),
                total: ledger.total(),
            });
        }

        let token_check = if token.is_well_formed(self.secret) {
            TokenCheck::Valid
        } else {
            warn!("Session token was malformed, minting a new one");
            *token = SessionToken::mint(self.secret, now_ms, rng);
            TokenCheck::Replaced
        };

        self.check_spread(ledger)?;
        Ok(token_check)
    }

    pub fn check_spread(&self, ledger: &StepLedger) -> Result<(), GateError> {
        let timestamps = ledger.verified_timestamps();
        if timestamps.len() < ledger.total() as usize {
            return Err(GateError::TimingAnomaly { spread_ms: None });
        }
        let (Some(min), Some(max)) = (timestamps.iter().min(), timestamps.iter().max()) else {
            return Err(GateError::TimingAnomaly { spread_ms: None });
        };
        let spread = max - min;
        if spread < self.min_spread_ms {
            return Err(GateError::TimingAnomaly { spread_ms: Some(spread) });
        }
        Ok(())
    }
}
