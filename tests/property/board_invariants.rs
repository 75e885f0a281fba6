//! Property-based tests for board state.
//!
//! Uses proptest to verify:
//! 1. Any interleaving of remote events, drags, completions, abandoned
//!    drags and reorders keeps every task in exactly one lane, the one its
//!    status names.
//! 2. Applying a `Created` event twice equals applying it once.
//! 3. Applying a `Deleted` event twice equals applying it once.
//! 4. A drag that is rejected with no other change restores the board.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashSet;

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;

use taskboard::api::ApiError;
use taskboard::board::{Board, MoveTicket};
use taskboard_proto::event::BoardEvent;
use taskboard_proto::task::{Priority, Task, TaskId, TaskStatus, UserId, UserRef};

fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

fn make_task(id: u8, status: TaskStatus, updated: i64) -> Task {
    Task {
        id: TaskId::new(format!("t{id}")),
        title: format!("Task {id}"),
        description: None,
        status,
        priority: Priority::Medium,
        due_date: None,
        assigned_to: None,
        created_by: UserRef::from_id(UserId::new("u1")),
        project: "p1".to_string(),
        created_at: ts(1_000),
        updated_at: ts(updated),
    }
}

#[derive(Debug, Clone)]
enum Op {
    Created(u8, TaskStatus),
    Updated(u8, TaskStatus, i64),
    Deleted(u8),
    Begin(u8, TaskStatus, usize),
    Complete { ok: bool, updated: i64 },
    Abandon,
    Reorder(TaskStatus, usize, usize),
}

fn arb_status() -> impl Strategy<Value = TaskStatus> {
    prop::sample::select(TaskStatus::ALL.to_vec())
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..8, arb_status()).prop_map(|(id, s)| Op::Created(id, s)),
        (0u8..8, arb_status(), 1_000i64..5_000).prop_map(|(id, s, t)| Op::Updated(id, s, t)),
        (0u8..8).prop_map(Op::Deleted),
        (0u8..8, arb_status(), 0usize..6).prop_map(|(id, s, i)| Op::Begin(id, s, i)),
        (any::<bool>(), 1_000i64..5_000).prop_map(|(ok, updated)| Op::Complete { ok, updated }),
        (arb_status(), 0usize..6, 0usize..6).prop_map(|(s, a, b)| Op::Reorder(s, a, b)),
        Just(Op::Abandon),
    ]
}

fn apply(board: &mut Board, tickets: &mut Vec<MoveTicket>, op: Op) {
    match op {
        Op::Created(id, status) => {
            board.apply_remote_event(&BoardEvent::Created(make_task(id, status, 1_000)));
        }
        Op::Updated(id, status, updated) => {
            board.apply_remote_event(&BoardEvent::Updated(make_task(id, status, updated)));
        }
        Op::Deleted(id) => {
            board.apply_remote_event(&BoardEvent::Deleted(TaskId::new(format!("t{id}"))));
        }
        Op::Begin(id, to, index) => {
            let task_id = TaskId::new(format!("t{id}"));
            if let Some(from) = board.get(&task_id).map(|t| t.status) {
                if let Ok(ticket) = board.begin_move(&task_id, from, to, index) {
                    tickets.push(ticket);
                }
            }
        }
        Op::Complete { ok, updated } => {
            if tickets.is_empty() {
                return;
            }
            let ticket = tickets.remove(0);
            let result = if ok {
                let mut server = board
                    .get(ticket.task_id())
                    .cloned()
                    .unwrap_or_else(|| make_task(0, ticket.to(), updated));
                server.id = ticket.task_id().clone();
                server.status = ticket.to();
                server.updated_at = ts(updated);
                Ok(server)
            } else {
                Err(ApiError::Network("reset".to_string()))
            };
            let _ = board.complete_move(ticket, result);
        }
        Op::Abandon => {
            if !tickets.is_empty() {
                let ticket = tickets.remove(0);
                board.abandon_move(&ticket);
            }
        }
        Op::Reorder(lane, from, to) => {
            let _ = board.reorder_within_lane(lane, from, to);
        }
    }
}

fn assert_partitioned(board: &Board) -> Result<(), TestCaseError> {
    let mut seen = HashSet::new();
    let mut in_lanes = 0;
    for status in TaskStatus::ALL {
        for task in board.lane(status) {
            prop_assert_eq!(task.status, status);
            prop_assert!(seen.insert(task.id.clone()), "duplicate {}", task.id);
            in_lanes += 1;
        }
    }
    prop_assert_eq!(in_lanes, board.len());
    prop_assert!(board.tasks().iter().all(|t| t.project == "p1"));
    Ok(())
}

proptest! {
    #[test]
    fn every_task_sits_in_exactly_one_lane(ops in prop::collection::vec(arb_op(), 0..60)) {
        let mut board = Board::new("p1");
        let mut tickets = Vec::new();
        for op in ops {
            apply(&mut board, &mut tickets, op);
            assert_partitioned(&board)?;
        }
    }

    #[test]
    fn created_twice_equals_created_once(
        ops in prop::collection::vec(arb_op(), 0..30),
        id in 0u8..10,
        status in arb_status(),
    ) {
        let mut board = Board::new("p1");
        let mut tickets = Vec::new();
        for op in ops {
            apply(&mut board, &mut tickets, op);
        }
        let event = BoardEvent::Created(make_task(id, status, 1_000));
        board.apply_remote_event(&event);
        let once = board.tasks().to_vec();
        board.apply_remote_event(&event);
        prop_assert_eq!(board.tasks(), once.as_slice());
    }

    #[test]
    fn deleted_twice_equals_deleted_once(
        ops in prop::collection::vec(arb_op(), 0..30),
        id in 0u8..10,
    ) {
        let mut board = Board::new("p1");
        let mut tickets = Vec::new();
        for op in ops {
            apply(&mut board, &mut tickets, op);
        }
        let event = BoardEvent::Deleted(TaskId::new(format!("t{id}")));
        board.apply_remote_event(&event);
        let once = board.tasks().to_vec();
        board.apply_remote_event(&event);
        prop_assert_eq!(board.tasks(), once.as_slice());
        let deleted_id = TaskId::new(format!("t{id}"));
        prop_assert!(!board.contains(&deleted_id));
    }

    #[test]
    fn lone_rejected_drag_restores_the_board(
        statuses in prop::collection::vec(arb_status(), 1..10),
        pick in any::<prop::sample::Index>(),
        to in arb_status(),
        index in 0usize..12,
    ) {
        let tasks: Vec<Task> = statuses
            .iter()
            .enumerate()
            .map(|(i, s)| make_task(u8::try_from(i).unwrap(), *s, 1_000))
            .collect();
        let mut board = Board::with_tasks("p1", tasks);
        let before = board.tasks().to_vec();
        let chosen = pick.get(&before).clone();
        prop_assume!(chosen.status != to);

        let ticket = board.begin_move(&chosen.id, chosen.status, to, index).unwrap();
        assert_partitioned(&board)?;
        let result = board.complete_move(ticket, Err(ApiError::Network("reset".to_string())));

        prop_assert!(result.is_err());
        prop_assert_eq!(board.tasks(), before.as_slice());
        prop_assert!(!board.is_move_pending(&chosen.id));
    }
}
