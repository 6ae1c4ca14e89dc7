//! Idle-gap detection over a worker's movements for one day.

use chrono::{DateTime, Utc};
use fieldclock_domain::Movement;
use serde::Serialize;

/// Whether an action point opens or closes a stretch of activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Start,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ActionPoint {
    pub time: DateTime<Utc>,
    pub kind: ActionKind,
}

/// The longest gap between the end of one movement and the start of the
/// next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InactivityPeriod {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_minutes: i64,
}

/// One `Start` per departure and one `End` per arrival, ascending by time.
///
/// The sort is stable, so points sharing an instant keep movement order.
pub fn action_points(movements: &[Movement]) -> Vec<ActionPoint> {
    let mut points: Vec<ActionPoint> = movements
        .iter()
        .flat_map(|movement| {
            let start =
                movement.departure_time.map(|time| ActionPoint { time, kind: ActionKind::Start });
            let end = movement.arrival_time.map(|time| ActionPoint { time, kind: ActionKind::End });
            start.into_iter().chain(end)
        })
        .collect();
    points.sort_by_key(|point| point.time);
    points
}

/// Longest `End -> Start` gap among consecutive points. Ties keep the
/// earliest gap. Fewer than two points yields nothing.
pub fn longest_inactivity(points: &[ActionPoint]) -> Option<InactivityPeriod> {
    let mut best: Option<InactivityPeriod> = None;

    for pair in points.windows(2) {
        let (first, second) = (pair[0], pair[1]);
        if first.kind != ActionKind::End || second.kind != ActionKind::Start {
            continue;
        }

        let duration_minutes = (second.time - first.time).num_minutes();
        let longer = match best {
            None => true,
            Some(current) => duration_minutes > current.duration_minutes,
        };
        if longer {
            best = Some(InactivityPeriod {
                start_time: first.time,
                end_time: second.time,
                duration_minutes,
            });
        }
    }

    best
}

/// Convenience wrapper over [`action_points`] and [`longest_inactivity`].
pub fn analyze(movements: &[Movement]) -> Option<InactivityPeriod> {
    longest_inactivity(&action_points(movements))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use fieldclock_domain::MovementStatus;

    use super::*;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 4, hour, minute, 0).single().expect("valid timestamp")
    }

    fn point(kind: ActionKind, hour: u32, minute: u32) -> ActionPoint {
        ActionPoint { time: at(hour, minute), kind }
    }

    fn movement(id: &str, departure: (u32, u32), arrival: (u32, u32)) -> Movement {
        Movement {
            id: id.into(),
            worker_id: "w1".into(),
            status: MovementStatus::Completed,
            departure_time: Some(at(departure.0, departure.1)),
            arrival_time: Some(at(arrival.0, arrival.1)),
            created_at: at(6, 0),
            updated_at: at(arrival.0, arrival.1),
        }
    }

    #[test]
    fn picks_the_longest_end_to_start_gap() {
        let points = vec![
            point(ActionKind::End, 9, 0),
            point(ActionKind::Start, 9, 10),
            point(ActionKind::End, 9, 20),
            point(ActionKind::Start, 11, 5),
        ];

        let gap = longest_inactivity(&points).expect("gap found");
        assert_eq!(gap.start_time, at(9, 20));
        assert_eq!(gap.end_time, at(11, 5));
        assert_eq!(gap.duration_minutes, 105);
    }

    #[test]
    fn ties_resolve_to_the_earliest_gap() {
        let points = vec![
            point(ActionKind::End, 9, 0),
            point(ActionKind::Start, 10, 0),
            point(ActionKind::End, 11, 0),
            point(ActionKind::Start, 12, 0),
        ];

        let gap = longest_inactivity(&points).expect("gap found");
        assert_eq!(gap.start_time, at(9, 0));
    }

    #[test]
    fn back_to_back_movements_still_report_a_gap() {
        let points = vec![
            point(ActionKind::Start, 8, 0),
            point(ActionKind::End, 9, 30),
            point(ActionKind::Start, 9, 30),
            point(ActionKind::End, 11, 0),
        ];

        let gap = longest_inactivity(&points).expect("zero-length gap is still a gap");
        assert_eq!(gap.start_time, at(9, 30));
        assert_eq!(gap.duration_minutes, 0);
    }

    #[test]
    fn start_to_end_pairs_are_ignored() {
        let points = vec![point(ActionKind::Start, 8, 0), point(ActionKind::End, 12, 0)];
        assert_eq!(longest_inactivity(&points), None);
    }

    #[test]
    fn single_point_has_no_signal() {
        assert_eq!(longest_inactivity(&[point(ActionKind::End, 9, 0)]), None);
        assert_eq!(longest_inactivity(&[]), None);
    }

    #[test]
    fn builds_points_from_unordered_movements() {
        let movements = vec![movement("m2", (13, 30), (15, 0)), movement("m1", (8, 0), (12, 0))];

        let points = action_points(&movements);
        let kinds: Vec<ActionKind> = points.iter().map(|p| p.kind).collect();
        assert_eq!(
            kinds,
            vec![ActionKind::Start, ActionKind::End, ActionKind::Start, ActionKind::End]
        );

        let gap = analyze(&movements).expect("gap found");
        assert_eq!(gap.duration_minutes, 90);
        assert_eq!(gap.start_time, at(12, 0));
    }

    #[test]
    fn missing_timestamps_contribute_no_points() {
        let mut open = movement("m1", (8, 0), (9, 0));
        open.arrival_time = None;
        open.status = MovementStatus::InProgress;

        assert_eq!(action_points(&[open]).len(), 1);
    }
}
