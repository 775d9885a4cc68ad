use uuid::Uuid;

const PREFIX: &str = "ludo";

pub fn ready(match_id: Uuid, user_id: Uuid) -> String {
    format!("{PREFIX}:{match_id}:ready:{user_id}")
}

pub fn dice(match_id: Uuid, user_id: Uuid) -> String {
    format!("{PREFIX}:{match_id}:dice:{user_id}")
}

pub fn consecutive_sixes(match_id: Uuid) -> String {
    format!("{PREFIX}:{match_id}:consecutive_sixes")
}

pub fn timeouts(match_id: Uuid, user_id: Uuid) -> String {
    format!("{PREFIX}:{match_id}:timeouts:{user_id}")
}

pub fn disconnect(match_id: Uuid, user_id: Uuid) -> String {
    format!("{PREFIX}:{match_id}:disconnect:{user_id}")
}

/// Every key a finished match may have left behind.
pub fn all_for_match(match_id: Uuid, users: &[Uuid]) -> Vec<String> {
    let mut keys = vec![consecutive_sixes(match_id)];
    for user_id in users {
        keys.push(ready(match_id, *user_id));
        keys.push(dice(match_id, *user_id));
        keys.push(timeouts(match_id, *user_id));
        keys.push(disconnect(match_id, *user_id));
    }
    keys
}
