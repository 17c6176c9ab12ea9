use chrono::Utc;

use super::*;

fn notification(id: &str, kind: NotificationKind, sender: &str, room: Option<&str>) -> Notification {
    Notification {
        id: id.into(),
        kind,
        sender_id: sender.into(),
        sender_name: None,
        sender_avatar: None,
        room_id: room.map(Into::into),
        message: format!("event from {sender}"),
        read: false,
        created_at: Utc::now(),
    }
}

#[test]
fn push_prepends_most_recent_first() {
    let mut set = NotificationSet::default();
    set.push(notification("n1", NotificationKind::Request, "u2", None));
    set.push(notification("n2", NotificationKind::Message, "u3", Some("u1_u3")));

    let ids: Vec<_> = set.snapshot().into_iter().map(|n| n.id.0).collect();
    assert_eq!(ids, ["n2", "n1"]);
}

#[test]
fn push_dedupes_by_id_not_by_content() {
    let mut set = NotificationSet::default();
    assert!(set.push(notification("n1", NotificationKind::Message, "u2", Some("u1_u2"))));
    assert!(!set.push(notification("n1", NotificationKind::Message, "u2", Some("u1_u2"))));

    // Two independent events may share their display text.
    assert!(set.push(notification("n2", NotificationKind::Message, "u2", Some("u1_u2"))));
    assert_eq!(set.snapshot().len(), 2);
}

#[test]
fn mark_read_flips_once_and_suppresses_the_second_call() {
    let mut set = NotificationSet::default();
    set.push(notification("n1", NotificationKind::Message, "u2", Some("u1_u2")));

    assert!(set.mark_read(&"n1".into()));
    assert!(!set.mark_read(&"n1".into()));
    assert!(set.snapshot()[0].read);
}

#[test]
fn mark_read_of_unknown_id_is_a_no_op() {
    let mut set = NotificationSet::default();
    assert!(!set.mark_read(&"missing".into()));
}

#[test]
fn mark_all_read_reports_whether_anything_changed() {
    let mut set = NotificationSet::default();
    for i in 0..5 {
        set.push(notification(
            &format!("n{i}"),
            NotificationKind::Message,
            "u2",
            Some("u1_u2"),
        ));
    }

    assert!(set.mark_all_read());
    assert!(set.snapshot().iter().all(|n| n.read));
    assert!(!set.mark_all_read());
}

#[test]
fn unread_for_room_matches_kind_room_and_peer() {
    let mut set = NotificationSet::default();
    set.push(notification("match", NotificationKind::Message, "u2", Some("u1_u2")));
    set.push(notification("wrong-kind", NotificationKind::Request, "u2", Some("u1_u2")));
    set.push(notification("wrong-room", NotificationKind::Message, "u2", Some("u1_u3")));
    set.push(notification("wrong-peer", NotificationKind::Message, "u3", Some("u1_u2")));
    let mut read = notification("already-read", NotificationKind::Message, "u2", Some("u1_u2"));
    read.read = true;
    set.push(read);

    let ids = set.unread_for_room(&"u1_u2".into(), &"u2".into());
    assert_eq!(ids, ["match".into()]);
}
