use uuid::Uuid;

pub type UserId = Uuid;
pub type PostId = Uuid;
pub type RoleId = i32;

/// Shorten a UUID to its first 8 characters for log output.
pub fn abbrev_uuid(uuid: &Uuid) -> String {
    uuid.to_string().chars().take(8).collect()
}
