use lottery_store::{AppearanceSnapshot, DrawData, EntryKind, HistoryManager, KeyValueBackend, SettingsManager};
use tracing::info;

use crate::random::{BoundedRandom, RandomSource};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DrawError {
    #[error("there are no prizes left to draw")]
    NoPrizes,
    #[error("there are no participants to draw from")]
    NoParticipants,
}

/// What happens to the drawn prize and winner afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DrawMode {
    /// Remove the prize and the winner so the next draw moves on.
    #[default]
    Consume,
    /// Leave prizes and participants as they are.
    Keep,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DrawOutcome {
    pub record_id: i64,
    pub prize: String,
    pub winner: String,
    pub total_participants: usize,
    /// Prizes still waiting to be drawn.
    pub remaining_prizes: usize,
}

/// Draw a winner for the first prize and record the result.
pub async fn draw<B, P>(
    settings: &mut SettingsManager<B>,
    history: &mut HistoryManager<B>,
    random: &BoundedRandom<P>,
    mode: DrawMode,
) -> Result<DrawOutcome, DrawError>
where
    B: KeyValueBackend,
    P: RandomSource,
{
    let prize = settings.prizes().first().cloned().ok_or(DrawError::NoPrizes)?;
    let participants = settings.participants().to_vec();
    if participants.is_empty() {
        return Err(DrawError::NoParticipants);
    }

    let index = random.index(participants.len()).await;
    let winner = participants[index.min(participants.len() - 1)].clone();

    let record_id = history.add_draw_record(DrawData {
        prize: prize.name.clone(),
        winner: winner.name.clone(),
        total_participants: participants.len(),
        participants_list: participants.iter().map(|p| p.name.clone()).collect(),
        settings: AppearanceSnapshot::from(settings.appearance()),
    });
    info!(record_id, prize = %prize.name, winner = %winner.name, ?mode, "Winner drawn");

    if mode == DrawMode::Consume {
        settings.remove(EntryKind::Participant, winner.id);
        settings.remove(EntryKind::Prize, prize.id);
    }

    Ok(DrawOutcome {
        record_id,
        prize: prize.name,
        winner: winner.name,
        total_participants: participants.len(),
        remaining_prizes: settings.prizes().len(),
    })
}
