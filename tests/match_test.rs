mod common;

use std::time::Duration;

use common::{fast_config, settle, start_match, TestController};

use tetris_battle::core::{AttackPattern, GarbageRow, SimulationEngine};
use tetris_battle::net::{AttackMessage, ConnId, TransportEvent, WireMessage};
use tetris_battle::session::{
    ControllerInput, ControllerPhase, MatchOutcome, PresentationIntent, SessionConfig,
};
use tetris_battle::types::{GameMode, MatchKind, PlayerId, CELL_GARBAGE};

fn finished(p: &[&mut TestController]) -> bool {
    p.iter().all(|c| c.phase() == ControllerPhase::Finished)
}

#[tokio::test]
async fn test_squad_elimination_ranking() {
    let (mut host, mut clients) = start_match(MatchKind::Squad, GameMode::Normal, fast_config()).await;
    let (mut b, mut c) = {
        let mut it = clients.drain(..);
        (it.next().unwrap(), it.next().unwrap())
    };
    let (a_id, b_id, c_id) = (PlayerId::host(), PlayerId::for_slot(1), PlayerId::for_slot(2));

    // A (host) tops out first.
    host.engine_mut().top_out();
    host.pump();
    {
        let state = host.match_state().unwrap();
        assert_eq!(state.elimination_order(), &[a_id.clone()]);
        assert_eq!(state.alive(), &[b_id.clone(), c_id.clone()]);
    }
    assert_eq!(host.phase(), ControllerPhase::Spectating);
    assert!(host.presentation().grayed);
    assert!(host.presentation().game_over_shown);

    // Clients learn of it from the host.
    settle(&mut [&mut host, &mut b, &mut c], |p| {
        p[1].alive().len() == 2 && p[2].alive().len() == 2
    })
    .await;

    // B next; C survives and wins.
    b.engine_mut().top_out();
    settle(&mut [&mut host, &mut b, &mut c], finished).await;

    let expected = MatchOutcome::Ranking(vec![a_id.clone(), b_id.clone(), c_id.clone()]);
    assert_eq!(host.outcome(), Some(&expected));
    assert_eq!(b.outcome(), Some(&expected));
    assert_eq!(c.outcome(), Some(&expected));
    assert_eq!(c.presentation().result, Some(expected));
    assert_eq!(host.match_state().unwrap().elimination_order(), &[a_id, b_id]);

    // Nothing is processed after the end.
    c.engine_mut().top_out();
    c.pump();
    assert_eq!(c.phase(), ControllerPhase::Finished);
}

#[tokio::test]
async fn test_squad_attack_fans_out_via_host() {
    let (mut host, mut clients) = start_match(MatchKind::Squad, GameMode::Normal, fast_config()).await;
    let (mut b, mut c) = {
        let mut it = clients.drain(..);
        (it.next().unwrap(), it.next().unwrap())
    };

    // B clears rows 18-19 with a piece that had cells at x=4 on both.
    b.engine_mut()
        .clear(&[18, 19], &[(4, 17), (4, 18), (4, 19), (5, 19)], false);
    settle(&mut [&mut host, &mut b, &mut c], |p| {
        p[0].incoming().len() == 1 && p[2].incoming().len() == 1
    })
    .await;
    assert!(b.incoming().is_empty());

    let pending = host.incoming().pending();
    assert_eq!(pending[0].source(), &PlayerId::for_slot(1));
    assert_eq!(pending[0].hole_columns(), vec![4, 4]);

    // Applied only at the next spawn.
    assert_eq!(host.engine().board().garbage_cells(), 0);
    host.engine_mut().spawn();
    host.pump();
    assert!(host.incoming().is_empty());
    assert_eq!(host.engine().board().garbage_cells(), 18);
    assert_eq!(host.engine().board().get(4, 19), Some(0));
    assert_eq!(host.engine().board().get(3, 19), Some(CELL_GARBAGE));

    // Pending garbage shows up in the board the host broadcasts.
    settle(&mut [&mut host, &mut b, &mut c], |p| {
        p[0].remote_boards()
            .get(&PlayerId::for_slot(2))
            .is_some_and(|s| s.incoming == vec![2])
    })
    .await;
}

#[tokio::test]
async fn test_single_line_clear_sends_nothing() {
    let (mut host, mut clients) = start_match(MatchKind::Versus, GameMode::Normal, fast_config()).await;
    let mut b = clients.remove(0);

    host.engine_mut().clear(&[19], &[(0, 19)], false);
    host.pump();
    tokio::time::sleep(Duration::from_millis(50)).await;
    b.pump();
    assert!(b.incoming().is_empty());

    host.engine_mut()
        .clear(&[16, 17, 18, 19], &[(0, 16), (0, 17), (0, 18), (0, 19)], true);
    settle(&mut [&mut host, &mut b], |p| p[1].incoming().pending_lines() == 4).await;
}

#[tokio::test]
async fn test_versus_timer_expiry_compares_scores() {
    // Long enough for both scores to reach the host before time runs out.
    let config = SessionConfig {
        timer_secs: 25,
        ..fast_config()
    };
    let (mut host, mut clients) = start_match(MatchKind::Versus, GameMode::Timer, config).await;
    let mut b = clients.remove(0);

    host.engine_mut().set_score(5000);
    b.engine_mut().set_score(4800);
    settle(&mut [&mut host, &mut b], finished).await;

    let outcome = host.outcome().cloned().unwrap();
    match &outcome {
        MatchOutcome::Winner { winner, scores } => {
            assert_eq!(winner, &PlayerId::host());
            assert_eq!((scores.score_a, scores.score_b), (5000, 4800));
        }
        other => panic!("expected a winner, got {other:?}"),
    }
    assert_eq!(b.outcome(), Some(&outcome));
    assert!(host.match_state().unwrap().elimination_order().is_empty());
    assert!(!host.engine().auto_drop);
    assert!(!b.engine().auto_drop);
    // Countdown was mirrored to the client.
    assert!(!b.presentation().timer.is_empty());
}

#[tokio::test]
async fn test_versus_timer_top_out_before_expiry() {
    let config = SessionConfig {
        timer_secs: 25,
        ..fast_config()
    };
    let (mut host, mut clients) = start_match(MatchKind::Versus, GameMode::Timer, config).await;
    let mut b = clients.remove(0);
    assert!(host.timer_running());

    // B has the higher score but tops out with time left.
    host.engine_mut().set_score(100);
    b.engine_mut().set_score(9000);
    b.pump();
    b.engine_mut().top_out();
    settle(&mut [&mut host, &mut b], finished).await;

    let outcome = host.outcome().cloned().unwrap();
    assert_eq!(outcome.winner(), Some(&PlayerId::host()));
    assert_eq!(b.outcome(), Some(&outcome));
    assert!(!host.timer_running());
    assert!(!host.engine().auto_drop);

    // No countdown after the end.
    let (host_ticks, b_ticks) = (host.presentation().timer.len(), b.presentation().timer.len());
    tokio::time::sleep(Duration::from_millis(100)).await;
    host.pump();
    b.pump();
    assert_eq!(host.presentation().timer.len(), host_ticks);
    assert_eq!(b.presentation().timer.len(), b_ticks);
}

#[tokio::test]
async fn test_versus_simultaneous_game_over_equal_scores_draws() {
    let (mut host, mut clients) = start_match(MatchKind::Versus, GameMode::Normal, fast_config()).await;
    let mut b = clients.remove(0);

    host.engine_mut().set_score(3000);
    b.engine_mut().set_score(3000);
    settle(&mut [&mut host, &mut b], |p| {
        p[0].match_state()
            .and_then(|s| s.score(&PlayerId::for_slot(1)))
            == Some(3000)
    })
    .await;

    // B's game-over waits in the host inbox until both are handled in one pass.
    b.engine_mut().top_out();
    b.pump();
    tokio::time::sleep(Duration::from_millis(100)).await;
    host.engine_mut().top_out();
    host.pump();

    assert!(matches!(host.outcome(), Some(MatchOutcome::Draw(_))));
    settle(&mut [&mut host, &mut b], finished).await;
    assert!(matches!(b.outcome(), Some(MatchOutcome::Draw(_))));
}

#[tokio::test]
async fn test_versus_survivor_wins() {
    let (mut host, mut clients) = start_match(MatchKind::Versus, GameMode::Item, fast_config()).await;
    let mut b = clients.remove(0);

    host.engine_mut().set_score(100);
    b.engine_mut().set_score(9000);
    b.pump();
    b.engine_mut().top_out();
    settle(&mut [&mut host, &mut b], finished).await;

    assert_eq!(
        host.outcome().and_then(MatchOutcome::winner),
        Some(&PlayerId::host())
    );
}

#[tokio::test]
async fn test_survivor_forces_end_mid_match() {
    let (mut host, mut clients) = start_match(MatchKind::Squad, GameMode::Normal, fast_config()).await;
    let mut c = clients.pop().unwrap();
    let mut b = clients.pop().unwrap();
    let (a_id, b_id, c_id) = (PlayerId::host(), PlayerId::for_slot(1), PlayerId::for_slot(2));

    host.engine_mut().set_score(100);
    b.engine_mut().set_score(300);
    c.engine_mut().top_out();
    settle(&mut [&mut host, &mut b, &mut c], |p| {
        let state = p[0].match_state().unwrap();
        state.alive().len() == 2 && state.score(&PlayerId::for_slot(1)) == Some(300)
    })
    .await;

    // Eliminated players cannot end it.
    assert_eq!(c.force_end(), None);
    host.pump();
    assert_eq!(host.phase(), ControllerPhase::Playing);

    // A client survivor asks; the host concludes with the standings as they are.
    assert_eq!(b.force_end(), None);
    settle(&mut [&mut host, &mut b, &mut c], finished).await;

    let expected = MatchOutcome::Ranking(vec![c_id, a_id, b_id]);
    for peer in [&host, &b, &c] {
        assert_eq!(peer.outcome(), Some(&expected));
        assert_eq!(peer.presentation().result.as_ref(), Some(&expected));
    }
    assert_eq!(host.force_end(), None);
}

#[tokio::test]
async fn test_mid_match_disconnect_aborts() {
    let (mut host, mut clients) = start_match(MatchKind::Squad, GameMode::Normal, fast_config()).await;
    let mut c = clients.pop().unwrap();
    let mut b = clients.pop().unwrap();

    b.handle_intent(PresentationIntent::Cancel);
    assert_eq!(b.phase(), ControllerPhase::Closed);
    drop(b);

    settle(&mut [&mut host, &mut c], finished).await;
    for peer in [&host, &c] {
        match peer.outcome() {
            Some(MatchOutcome::Aborted { reason }) => assert!(reason.contains("player-1")),
            other => panic!("expected abort, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_own_and_malformed_attacks_are_dropped() {
    let (mut host, mut clients) = start_match(MatchKind::Squad, GameMode::Normal, fast_config()).await;
    let mut b = clients.remove(0);
    let b_id = b.local_id().clone();

    let own = AttackPattern::new(b_id.clone(), vec![GarbageRow::new(1).unwrap()]);
    let mut bad = AttackMessage::from_pattern(&own, None);
    // Two holes in one row.
    bad.pattern[0][5] = 0;

    let inbox = b.sender();
    for msg in [
        WireMessage::Attack(AttackMessage::from_pattern(&own, Some(b_id))),
        WireMessage::Attack(bad),
    ] {
        inbox
            .send(ControllerInput::Net(TransportEvent::Message {
                conn: ConnId::HOST,
                msg,
            }))
            .unwrap();
    }
    b.pump();
    assert!(b.incoming().is_empty());
    assert_eq!(b.phase(), ControllerPhase::Playing);

    host.pump();
    assert_eq!(host.phase(), ControllerPhase::Playing);
}

#[tokio::test]
async fn test_eliminated_player_stops_steering_but_keeps_watching() {
    let (mut host, mut clients) = start_match(MatchKind::Squad, GameMode::Normal, fast_config()).await;
    let mut b = clients.remove(0);
    let mut c = clients.remove(0);

    b.engine_mut().top_out();
    settle(&mut [&mut host, &mut b, &mut c], |p| p[1].phase() == ControllerPhase::Spectating).await;

    b.handle_intent(PresentationIntent::HardDrop);
    assert!(b.engine().inputs.is_empty());

    c.handle_intent(PresentationIntent::MoveLeft);
    assert_eq!(c.engine().inputs, vec!["left"]);

    c.engine_mut().set_score(1234);
    settle(&mut [&mut host, &mut b, &mut c], |p| {
        p[1].remote_boards()
            .get(&PlayerId::for_slot(2))
            .is_some_and(|s| s.score == 1234)
    })
    .await;
}
