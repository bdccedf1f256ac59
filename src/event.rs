//! Observable events.
//!
//! Every accepted intent produces an ordered list of events mirroring the
//! resolution order. Each event carries a scope: public events are visible to
//! every observer, private events only to the named player (card identities
//! drawn into hidden hands, say). Public summary events are emitted alongside
//! private ones so other observers still see aggregate counts.

use crate::ids::{CardId, PlanetId, PlayerId, SystemId, UnitId};
use crate::player::CommandPool;
use crate::types::UnitType;

/// Who may see an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum Scope {
    Public,
    Private(PlayerId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct Event {
    pub scope: Scope,
    pub kind: EventKind,
}

impl Event {
    pub fn public(kind: EventKind) -> Self {
        Self {
            scope: Scope::Public,
            kind,
        }
    }

    pub fn private(player: PlayerId, kind: EventKind) -> Self {
        Self {
            scope: Scope::Private(player),
            kind,
        }
    }

    pub fn visible_to(&self, viewer: PlayerId) -> bool {
        match self.scope {
            Scope::Public => true,
            Scope::Private(owner) => owner == viewer,
        }
    }
}

/// The set of observable game events.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum EventKind {
    // Phase / round flow
    PhaseChanged {
        phase: String,
        round: u32,
    },
    TurnBegan {
        player: PlayerId,
    },
    PlayerPassed {
        player: PlayerId,
    },
    SpeakerChanged {
        player: PlayerId,
    },
    PlayerEliminated {
        player: PlayerId,
    },
    GameEnded {
        winner: PlayerId,
    },

    // Strategy phase
    StrategyCardChosen {
        player: PlayerId,
        initiative: u8,
        name: String,
    },
    StrategyCardGainedTradeGood {
        initiative: u8,
        total: u8,
    },
    SecondaryResolved {
        player: PlayerId,
        card: crate::card::StrategyCard,
    },

    // Command tokens
    CommandTokenPlaced {
        player: PlayerId,
        system: SystemId,
    },
    CommandTokenReturned {
        player: PlayerId,
        system: SystemId,
    },
    CommandTokensGained {
        player: PlayerId,
        pool: CommandPool,
        count: u8,
    },
    CommandTokenSpent {
        player: PlayerId,
        pool: CommandPool,
    },

    // Units
    SystemActivated {
        player: PlayerId,
        system: SystemId,
    },
    UnitMoved {
        unit: UnitId,
        from: SystemId,
        to: SystemId,
    },
    UnitPlaced {
        unit: UnitId,
        owner: PlayerId,
        unit_type: UnitType,
    },
    UnitDestroyed {
        unit: UnitId,
        owner: PlayerId,
        unit_type: UnitType,
    },
    UnitReturnedToReinforcements {
        unit: UnitId,
        owner: PlayerId,
    },
    GroundForcesCommitted {
        player: PlayerId,
        planet: PlanetId,
        count: u8,
    },

    // Combat
    DiceRolled {
        player: PlayerId,
        context: String,
        faces: Vec<u8>,
    },
    DieRerolled {
        player: PlayerId,
        die: usize,
        old_face: u8,
        new_face: u8,
    },
    HitsProduced {
        player: PlayerId,
        count: u8,
    },
    HitAssigned {
        unit: UnitId,
    },
    SustainedDamage {
        unit: UnitId,
    },
    UnitRepaired {
        unit: UnitId,
    },
    RetreatAnnounced {
        player: PlayerId,
    },
    UnitsRetreated {
        player: PlayerId,
        to: SystemId,
    },
    CombatEnded {
        system: SystemId,
        winner: Option<PlayerId>,
    },

    // Planets
    PlanetExhausted {
        planet: PlanetId,
    },
    PlanetReadied {
        planet: PlanetId,
    },
    PlanetControlChanged {
        planet: PlanetId,
        from: Option<PlayerId>,
        to: Option<PlayerId>,
    },
    PlanetAttached {
        planet: PlanetId,
        card: CardId,
    },
    CustodiansRemoved {
        player: PlayerId,
    },
    NexusActivated,
    ExplorationResolved {
        player: PlayerId,
        planet: Option<PlanetId>,
        card: CardId,
    },

    // Cards
    CardDrawn {
        player: PlayerId,
        card: CardId,
    },
    CardsDrawn {
        player: PlayerId,
        count: u8,
        deck: String,
    },
    CardDiscarded {
        player: PlayerId,
        card: CardId,
    },
    CardPurged {
        card: CardId,
    },
    ActionCardPlayed {
        player: PlayerId,
        card: CardId,
    },
    ActionCardCancelled {
        player: PlayerId,
        card: CardId,
        cancelled_by: PlayerId,
    },
    PromissoryNotePlayed {
        player: PlayerId,
        card: CardId,
    },
    PromissoryNoteReturned {
        owner: PlayerId,
        card: CardId,
    },
    RelicDrawn {
        player: PlayerId,
        card: CardId,
    },
    TechResearched {
        player: PlayerId,
        card: CardId,
    },

    // Objectives / victory
    ObjectiveRevealed {
        card: CardId,
    },
    ObjectiveScored {
        player: PlayerId,
        card: CardId,
    },
    VictoryPointsGained {
        player: PlayerId,
        count: u8,
        total: u8,
    },

    // Agenda
    AgendaRevealed {
        card: CardId,
    },
    VotesCast {
        player: PlayerId,
        outcome: String,
        votes: u16,
    },
    AgendaOutcome {
        card: CardId,
        outcome: String,
    },
    LawEnacted {
        card: CardId,
        owner: Option<PlayerId>,
    },
    LawDiscarded {
        card: CardId,
    },

    // Economy
    TradeGoodsGained {
        player: PlayerId,
        count: u8,
        total: u8,
    },
    TradeGoodsSpent {
        player: PlayerId,
        count: u8,
    },
    CommoditiesReplenished {
        player: PlayerId,
        total: u8,
    },
    CommodityConverted {
        from: PlayerId,
        to: PlayerId,
        count: u8,
    },
    TransactionCompleted {
        from: PlayerId,
        to: PlayerId,
    },
    ResourcesSpent {
        player: PlayerId,
        planets: Vec<PlanetId>,
        trade_goods: u8,
    },
    InfluenceSpent {
        player: PlayerId,
        planets: Vec<PlanetId>,
        trade_goods: u8,
    },

    // Production
    UnitsProduced {
        player: PlayerId,
        system: SystemId,
        count: u8,
    },

    /// An effect atom found its preconditions gone and no-opped.
    Warning {
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_private_events_visible_to_owner_only() {
        let p0 = PlayerId::from_index(0);
        let p1 = PlayerId::from_index(1);
        let ev = Event::private(
            p0,
            EventKind::CardDrawn {
                player: p0,
                card: CardId::from_raw(4),
            },
        );
        assert!(ev.visible_to(p0));
        assert!(!ev.visible_to(p1));
        let pub_ev = Event::public(EventKind::PlayerPassed { player: p0 });
        assert!(pub_ev.visible_to(p1));
    }
}
