//! The literal end-to-end scenarios: each drives the engine through a
//! sequence of intents and checks the observable events.

use super::{add_planet, game_of, seed_with_faces, skirmish};
use crate::ability::AbilitySource;
use crate::event::EventKind;
use crate::galaxy::{HexCoord, SystemTile};
use crate::ids::{CardId, SystemId};
use crate::intent::{
    HitAssignment, Intent, MovementOrder, ProductionOrder, Rejection, Spend, TransactionOffer,
};
use crate::types::{Anomaly, TileBack, UnitType};
use crate::unit::UnitLocation;

fn order(unit: crate::ids::UnitId, path: &[u16]) -> MovementOrder {
    MovementOrder {
        unit,
        path: path.iter().map(|&s| SystemId::from_raw(s)).collect(),
        cargo: Vec::new(),
    }
}

#[test]
fn scenario_asteroid_field_blocks_transit() {
    let (mut state, a, _b) = skirmish(1);
    state
        .galaxy
        .system_mut(SystemId::from_raw(2))
        .unwrap()
        .anomalies
        .insert(Anomaly::AsteroidField);
    let cruiser = state
        .spawn_unit(a, UnitType::Cruiser, UnitLocation::Space(SystemId::from_raw(1)))
        .unwrap();
    let mut game = game_of(state);

    game.submit(&Intent::ActivateSystem {
        player: a,
        system: SystemId::from_raw(3),
    })
    .unwrap();

    let before = game.state().clone();
    let err = game
        .submit(&Intent::DeclareMovement {
            player: a,
            movements: vec![order(cruiser, &[2, 3])],
        })
        .unwrap_err();
    assert!(matches!(err, Rejection::RulesViolation { .. }));
    assert_eq!(err.code(), "asteroid_field");
    assert_eq!(game.state(), &before, "a rejected intent changes nothing");
}

#[test]
fn scenario_nebula_defender_bonus_decides_the_exchange() {
    // AFB rolls four wildcard dice first (two destroyers), then attacker
    // and defender each roll one combat die: both show 8.
    let seed = seed_with_faces(&[0, 0, 0, 0, 8, 8]);
    let (mut state, a, b) = skirmish(seed);
    state
        .galaxy
        .system_mut(SystemId::from_raw(2))
        .unwrap()
        .anomalies
        .insert(Anomaly::Nebula);
    let attacker_ship = state
        .spawn_unit(a, UnitType::Destroyer, UnitLocation::Space(SystemId::from_raw(1)))
        .unwrap();
    let defender_ship = state
        .spawn_unit(b, UnitType::Destroyer, UnitLocation::Space(SystemId::from_raw(2)))
        .unwrap();
    let mut game = game_of(state);

    game.submit(&Intent::ActivateSystem {
        player: a,
        system: SystemId::from_raw(2),
    })
    .unwrap();
    game.submit(&Intent::DeclareMovement {
        player: a,
        movements: vec![order(attacker_ship, &[2])],
    })
    .unwrap();
    // Neither side retreats.
    game.submit(&Intent::AnnounceRetreat {
        player: b,
        retreat: false,
    })
    .unwrap();
    let events = game
        .submit(&Intent::AnnounceRetreat {
            player: a,
            retreat: false,
        })
        .unwrap();
    // Defender's 8 became a hit through the nebula bonus; attacker missed.
    assert!(events.iter().any(
        |e| matches!(&e.kind, EventKind::HitsProduced { player, count: 1 } if *player == b)
    ));
    // The attacker assigns the hit to their only ship and loses it.
    let events = game
        .submit(&Intent::AssignCombatHits {
            player: a,
            assignments: vec![HitAssignment {
                unit: attacker_ship,
                sustain: false,
            }],
        })
        .unwrap();
    assert!(events.iter().any(
        |e| matches!(&e.kind, EventKind::UnitDestroyed { unit, .. } if *unit == attacker_ship)
    ));
    assert!(events.iter().any(
        |e| matches!(&e.kind, EventKind::CombatEnded { winner: Some(w), .. } if *w == b)
    ));
    assert!(game.state().units.contains_key(&defender_ship));
}

#[test]
fn scenario_custodians_removal_and_control_of_mecatol() {
    let (mut state, a, _b) = skirmish(2);
    // Mecatol Rex adjacent to system 1.
    let mecatol_system = SystemId::from_raw(18);
    state.galaxy.place(
        SystemTile::new(mecatol_system, TileBack::Blue),
        HexCoord::new(0, 1),
    );
    let mecatol = add_planet(&mut state, 18, 18, None, 1, 6);
    state.planets.get_mut(&mecatol).unwrap().is_mecatol_rex = true;
    // A six-influence planet to pay the custodians with.
    let treasury = add_planet(&mut state, 40, 1, Some(a), 0, 6);
    let carrier = state
        .spawn_unit(a, UnitType::Carrier, UnitLocation::Space(mecatol_system))
        .unwrap();
    let infantry = state
        .spawn_unit(a, UnitType::Infantry, UnitLocation::Space(mecatol_system))
        .unwrap();
    assert!(state.custodians_on_mecatol);
    let mut game = game_of(state);

    game.submit(&Intent::ActivateSystem {
        player: a,
        system: mecatol_system,
    })
    .unwrap();
    game.submit(&Intent::DeclareMovement {
        player: a,
        movements: Vec::new(),
    })
    .unwrap();
    game.submit(&Intent::Bombard {
        player: a,
        rolls: Vec::new(),
    })
    .unwrap();
    let events = game
        .submit(&Intent::CommitGroundForces {
            player: a,
            commitments: vec![(infantry, mecatol)],
            custodians_payment: Some(Spend {
                planets: vec![treasury],
                trade_goods: 0,
            }),
        })
        .unwrap();
    assert!(events
        .iter()
        .any(|e| matches!(&e.kind, EventKind::CustodiansRemoved { player } if *player == a)));
    assert!(events.iter().any(
        |e| matches!(&e.kind, EventKind::VictoryPointsGained { player, total: 1, .. } if *player == a)
    ));
    assert!(!game.state().custodians_on_mecatol);
    assert_eq!(game.state().planets[&mecatol].controller, Some(a));
    assert!(game.state().units[&infantry].on_planet(mecatol));
    assert_eq!(game.state().players[&a].victory_points, 1);
    let _ = carrier;

    // The action runs to completion: production is the pending decision.
    game.submit(&Intent::Produce {
        player: a,
        orders: Vec::new(),
        spend: Spend::default(),
    })
    .unwrap();
}

#[test]
fn scenario_unpaid_custodians_commit_is_rejected() {
    let (mut state, a, _b) = skirmish(3);
    let mecatol_system = SystemId::from_raw(18);
    state.galaxy.place(
        SystemTile::new(mecatol_system, TileBack::Blue),
        HexCoord::new(0, 1),
    );
    let mecatol = add_planet(&mut state, 18, 18, None, 1, 6);
    state.planets.get_mut(&mecatol).unwrap().is_mecatol_rex = true;
    state
        .spawn_unit(a, UnitType::Carrier, UnitLocation::Space(mecatol_system))
        .unwrap();
    let infantry = state
        .spawn_unit(a, UnitType::Infantry, UnitLocation::Space(mecatol_system))
        .unwrap();
    let mut game = game_of(state);
    game.submit(&Intent::ActivateSystem {
        player: a,
        system: mecatol_system,
    })
    .unwrap();
    game.submit(&Intent::DeclareMovement {
        player: a,
        movements: Vec::new(),
    })
    .unwrap();
    game.submit(&Intent::Bombard {
        player: a,
        rolls: Vec::new(),
    })
    .unwrap();
    let err = game
        .submit(&Intent::CommitGroundForces {
            player: a,
            commitments: vec![(infantry, mecatol)],
            custodians_payment: None,
        })
        .unwrap_err();
    assert_eq!(err.code(), "custodians_unpaid");
    assert!(game.state().custodians_on_mecatol);
}

#[test]
fn scenario_commodity_conversion_in_a_transaction() {
    let (mut state, a, b) = skirmish(4);
    // Adjacent ships make the two neighbors.
    state
        .spawn_unit(a, UnitType::Cruiser, UnitLocation::Space(SystemId::from_raw(1)))
        .unwrap();
    state
        .spawn_unit(b, UnitType::Cruiser, UnitLocation::Space(SystemId::from_raw(2)))
        .unwrap();
    state.players.get_mut(&a).unwrap().commodities = 3;
    let mut game = game_of(state);

    game.submit(&Intent::ProposeTransaction {
        from: a,
        to: b,
        give: TransactionOffer {
            commodities: 2,
            ..Default::default()
        },
        receive: TransactionOffer::default(),
    })
    .unwrap();
    let events = game
        .submit(&Intent::ConfirmTransaction {
            player: b,
            accept: true,
        })
        .unwrap();

    assert_eq!(game.state().players[&a].commodities, 1);
    assert_eq!(game.state().players[&b].trade_goods, 2);
    assert!(events.iter().any(|e| matches!(
        &e.kind,
        EventKind::CommodityConverted { from, to, count: 2 } if *from == a && *to == b
    )));
    // The conversion does not read as "gaining trade goods" (LRR 21.5c).
    assert!(!events
        .iter()
        .any(|e| matches!(e.kind, EventKind::TradeGoodsGained { .. })));
    assert!(events
        .iter()
        .any(|e| matches!(e.kind, EventKind::TransactionCompleted { .. })));
}

#[test]
fn scenario_reroll_layering() {
    // Attacker rolls two cruiser dice (4, 4), defender one (5, a miss);
    // the first reroll turns die 0 into a 9, the second back into a 3.
    let seed = seed_with_faces(&[4, 4, 5, 9, 3]);
    let (mut state, a, b) = skirmish(seed);
    let c1 = state
        .spawn_unit(a, UnitType::Cruiser, UnitLocation::Space(SystemId::from_raw(1)))
        .unwrap();
    let c2 = state
        .spawn_unit(a, UnitType::Cruiser, UnitLocation::Space(SystemId::from_raw(1)))
        .unwrap();
    state
        .spawn_unit(b, UnitType::Cruiser, UnitLocation::Space(SystemId::from_raw(2)))
        .unwrap();
    let fire_team = CardId::from_raw(3);
    let scramble = CardId::from_raw(4);
    state.players.get_mut(&a).unwrap().action_cards.push(fire_team);
    state.players.get_mut(&a).unwrap().action_cards.push(scramble);
    let mut game = game_of(state);

    game.submit(&Intent::ActivateSystem {
        player: a,
        system: SystemId::from_raw(2),
    })
    .unwrap();
    game.submit(&Intent::DeclareMovement {
        player: a,
        movements: vec![order(c1, &[2]), order(c2, &[2])],
    })
    .unwrap();
    game.submit(&Intent::AnnounceRetreat {
        player: b,
        retreat: false,
    })
    .unwrap();
    game.submit(&Intent::AnnounceRetreat {
        player: a,
        retreat: false,
    })
    .unwrap();

    // First ability rerolls die 0: 4 -> 9.
    let events = game
        .submit(&Intent::UseReroll {
            player: a,
            source: AbilitySource::ActionCard(fire_team),
            roller: a,
            die: 0,
        })
        .unwrap();
    assert!(events.iter().any(|e| matches!(
        e.kind,
        EventKind::DieRerolled { die: 0, old_face: 4, new_face: 9, .. }
    )));

    // A distinct ability may reroll the same die again: 9 -> 3.
    let events = game
        .submit(&Intent::UseReroll {
            player: a,
            source: AbilitySource::ActionCard(scramble),
            roller: a,
            die: 0,
        })
        .unwrap();
    assert!(events.iter().any(|e| matches!(
        e.kind,
        EventKind::DieRerolled { die: 0, old_face: 9, new_face: 3, .. }
    )));

    // The first ability cannot go again.
    let err = game
        .submit(&Intent::UseReroll {
            player: a,
            source: AbilitySource::ActionCard(fire_team),
            roller: a,
            die: 0,
        })
        .unwrap_err();
    assert!(matches!(err, Rejection::InvalidIntent { .. }));

    // Close the window: final faces are [3, 4] and nobody hit.
    game.submit(&Intent::DeclineReroll { player: a }).unwrap();
    game.submit(&Intent::DeclineReroll { player: b }).unwrap();
    // No hits on either side: the next combat round is being announced.
    assert_eq!(
        game.state().pending.as_ref().map(|p| p.player),
        Some(b),
        "round two opens with the defender's retreat announcement"
    );
}

#[test]
fn scenario_gravity_rift_exit_destroys_the_ship() {
    let seed = seed_with_faces(&[2]);
    let (mut state, a, _b) = skirmish(seed);
    state
        .galaxy
        .system_mut(SystemId::from_raw(2))
        .unwrap()
        .anomalies
        .insert(Anomaly::GravityRift);
    let cruiser = state
        .spawn_unit(a, UnitType::Cruiser, UnitLocation::Space(SystemId::from_raw(1)))
        .unwrap();
    let mut game = game_of(state);

    game.submit(&Intent::ActivateSystem {
        player: a,
        system: SystemId::from_raw(3),
    })
    .unwrap();
    let events = game
        .submit(&Intent::DeclareMovement {
            player: a,
            movements: vec![order(cruiser, &[2, 3])],
        })
        .unwrap();
    assert!(events.iter().any(|e| matches!(
        &e.kind,
        EventKind::DiceRolled { context, faces, .. }
            if context == "gravity rift" && faces == &vec![2]
    )));
    assert!(events
        .iter()
        .any(|e| matches!(&e.kind, EventKind::UnitDestroyed { unit, .. } if *unit == cruiser)));
    assert!(
        game.state()
            .units_in_space(SystemId::from_raw(3))
            .next()
            .is_none(),
        "nothing arrives in the active system"
    );
}

#[test]
fn scenario_component_action_cancelled_keeps_the_turn() {
    let (mut state, a, b) = skirmish(6);
    let summit = CardId::from_raw(5);
    let sabotage = CardId::from_raw(1);
    state.players.get_mut(&a).unwrap().action_cards.push(summit);
    state.players.get_mut(&b).unwrap().action_cards.push(sabotage);
    let tokens_before = state.players[&a].command.tactic;
    let mut game = game_of(state);

    game.submit(&Intent::PlayActionCard {
        player: a,
        card: summit,
        targets: Default::default(),
    })
    .unwrap();
    // The opponent is offered the cancel and takes it.
    let events = game
        .submit(&Intent::ConfirmOptional {
            player: b,
            choice: Some(crate::intent::AbilityChoice {
                source: AbilitySource::ActionCard(sabotage),
                targets: Default::default(),
            }),
        })
        .unwrap();
    assert!(events
        .iter()
        .any(|e| matches!(e.kind, EventKind::ActionCardCancelled { .. })));
    assert_eq!(
        game.state().players[&a].command.tactic,
        tokens_before,
        "the cancelled card had no effect"
    );
    // The turn was not consumed: the same player is still on the clock.
    assert_eq!(
        game.state().pending.as_ref().map(|p| p.player),
        Some(a)
    );
    assert!(matches!(
        game.state().pending.as_ref().map(|p| &p.kind),
        Some(crate::intent::DecisionKind::TakeTurn)
    ));
}

#[test]
fn scenario_production_in_an_activated_system() {
    let (mut state, a, _b) = skirmish(7);
    let planet = add_planet(&mut state, 41, 2, Some(a), 3, 1);
    let dock = state
        .spawn_unit(a, UnitType::SpaceDock, UnitLocation::OnPlanet(planet))
        .unwrap();
    state.players.get_mut(&a).unwrap().trade_goods = 2;
    let mut game = game_of(state);

    game.submit(&Intent::ActivateSystem {
        player: a,
        system: SystemId::from_raw(2),
    })
    .unwrap();
    game.submit(&Intent::DeclareMovement {
        player: a,
        movements: Vec::new(),
    })
    .unwrap();
    game.submit(&Intent::Bombard {
        player: a,
        rolls: Vec::new(),
    })
    .unwrap();
    game.submit(&Intent::CommitGroundForces {
        player: a,
        commitments: Vec::new(),
        custodians_payment: None,
    })
    .unwrap();
    let events = game
        .submit(&Intent::Produce {
            player: a,
            orders: vec![ProductionOrder {
                producer: dock,
                build: vec![
                    crate::intent::BuildOrder {
                        unit_type: UnitType::Infantry,
                        on_planet: Some(planet),
                    },
                    crate::intent::BuildOrder {
                        unit_type: UnitType::Infantry,
                        on_planet: Some(planet),
                    },
                ],
            }],
            spend: Spend {
                planets: Vec::new(),
                trade_goods: 1,
            },
        })
        .unwrap();
    assert!(events
        .iter()
        .any(|e| matches!(e.kind, EventKind::UnitsProduced { count: 2, .. })));
    assert_eq!(game.state().players[&a].trade_goods, 1);
}
