use chrono::NaiveDateTime;

use crate::schema::{flags, scores, teams, triggers};

#[derive(Clone, Debug, Queryable, Serialize)]
pub struct Team {
    pub id: i32,
    pub name: String,
    pub country: String,
    pub website: String,
    pub subnets: String,
    pub notes: String,
}

impl Team {
    /// A team without a name hasn't been set up yet and is kept out of
    /// all public aggregations.
    pub fn is_configured(&self) -> bool {
        !self.name.is_empty()
    }
}

/// A scoring opportunity. Either `flag` is set (matched literally,
/// case-insensitive) or `validator` is set (checked by an external
/// program, looked up by `code`).
#[derive(Clone, Debug, Queryable, Serialize)]
pub struct Flag {
    pub id: i32,
    pub teamid: Option<i32>,
    pub triggerid: Option<i32>,
    pub code: Option<String>,
    pub flag: Option<String>,
    pub value: i32,
    pub writeup_value: Option<i32>,
    pub return_string: Option<String>,
    pub counter: Option<i32>,
    pub validator: Option<String>,
    pub description: String,
    pub tags: String,
}

impl Flag {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.split(',').any(|t| t.trim() == tag)
    }
}

#[derive(Clone, Debug, Queryable, Serialize)]
pub struct Score {
    pub id: i32,
    pub teamid: i32,
    pub flagid: i32,
    pub value: i32,
    pub writeup_value: Option<i32>,
    pub submit_time: NaiveDateTime,
    pub writeup_time: Option<NaiveDateTime>,
}

#[derive(Clone, Debug, Queryable, Serialize)]
pub struct Trigger {
    pub id: i32,
    pub flagid: i32,
    pub count: String,
    pub description: String,
}

#[derive(Debug, Deserialize, Insertable)]
#[serde(deny_unknown_fields)]
#[table_name = "scores"]
pub struct NewScore {
    pub teamid: i32,
    pub flagid: i32,
    pub value: i32,
    #[serde(default = "now_naive")]
    pub submit_time: NaiveDateTime,
}

fn now_naive() -> NaiveDateTime {
    chrono::Utc::now().naive_utc()
}

impl NewScore {
    /// A fresh score for `flag` at its face value, timestamped now.
    pub fn submission(teamid: i32, flag: &Flag) -> NewScore {
        NewScore::with_value(teamid, flag.id, flag.value)
    }

    pub fn with_value(teamid: i32, flagid: i32, value: i32) -> NewScore {
        NewScore {
            teamid,
            flagid,
            value,
            submit_time: chrono::Utc::now().naive_utc(),
        }
    }
}

// The admin CRUD payloads. `deny_unknown_fields` is what rejects a
// caller-supplied `id` (or any stray key) instead of reflecting over
// record attributes like the old server did.

#[derive(Debug, Deserialize, Insertable)]
#[serde(deny_unknown_fields)]
#[table_name = "teams"]
pub struct NewTeam {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub website: String,
    #[serde(default)]
    pub subnets: String,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Deserialize, Insertable)]
#[serde(deny_unknown_fields)]
#[table_name = "flags"]
pub struct NewFlag {
    pub teamid: Option<i32>,
    pub triggerid: Option<i32>,
    pub code: Option<String>,
    pub flag: Option<String>,
    pub value: i32,
    pub writeup_value: Option<i32>,
    pub return_string: Option<String>,
    pub counter: Option<i32>,
    pub validator: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: String,
}

#[derive(Debug, Deserialize, Insertable)]
#[serde(deny_unknown_fields)]
#[table_name = "triggers"]
pub struct NewTrigger {
    pub flagid: i32,
    pub count: String,
    #[serde(default)]
    pub description: String,
}

// Per-entity update allowlists. A `None` field is left untouched, so
// these can't set a nullable column back to NULL; delete and re-add the
// row for that.

#[derive(Debug, Default, Deserialize, AsChangeset)]
#[serde(deny_unknown_fields)]
#[table_name = "teams"]
pub struct UpdateTeam {
    pub name: Option<String>,
    pub country: Option<String>,
    pub website: Option<String>,
    pub subnets: Option<String>,
    pub notes: Option<String>,
}

impl UpdateTeam {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.country.is_none()
            && self.website.is_none()
            && self.subnets.is_none()
            && self.notes.is_none()
    }
}

#[derive(Debug, Default, Deserialize, AsChangeset)]
#[serde(deny_unknown_fields)]
#[table_name = "flags"]
pub struct UpdateFlag {
    pub teamid: Option<i32>,
    pub triggerid: Option<i32>,
    pub code: Option<String>,
    pub flag: Option<String>,
    pub value: Option<i32>,
    pub writeup_value: Option<i32>,
    pub return_string: Option<String>,
    pub counter: Option<i32>,
    pub validator: Option<String>,
    pub description: Option<String>,
    pub tags: Option<String>,
}

impl UpdateFlag {
    pub fn is_empty(&self) -> bool {
        self.teamid.is_none()
            && self.triggerid.is_none()
            && self.code.is_none()
            && self.flag.is_none()
            && self.value.is_none()
            && self.writeup_value.is_none()
            && self.return_string.is_none()
            && self.counter.is_none()
            && self.validator.is_none()
            && self.description.is_none()
            && self.tags.is_none()
    }
}

#[derive(Debug, Default, Deserialize, AsChangeset)]
#[serde(deny_unknown_fields)]
#[table_name = "triggers"]
pub struct UpdateTrigger {
    pub flagid: Option<i32>,
    pub count: Option<String>,
    pub description: Option<String>,
}

impl UpdateTrigger {
    pub fn is_empty(&self) -> bool {
        self.flagid.is_none() && self.count.is_none() && self.description.is_none()
    }
}

#[derive(Debug, Default, Deserialize, AsChangeset)]
#[serde(deny_unknown_fields)]
#[table_name = "scores"]
pub struct UpdateScore {
    pub teamid: Option<i32>,
    pub flagid: Option<i32>,
    pub value: Option<i32>,
    pub writeup_value: Option<i32>,
    pub submit_time: Option<NaiveDateTime>,
    pub writeup_time: Option<NaiveDateTime>,
}

impl UpdateScore {
    pub fn is_empty(&self) -> bool {
        self.teamid.is_none()
            && self.flagid.is_none()
            && self.value.is_none()
            && self.writeup_value.is_none()
            && self.submit_time.is_none()
            && self.writeup_time.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_matching() {
        let flag = Flag {
            id: 1,
            teamid: None,
            triggerid: None,
            code: None,
            flag: Some("flag{x}".to_owned()),
            value: 10,
            writeup_value: None,
            return_string: None,
            counter: None,
            validator: None,
            description: String::new(),
            tags: "cat:web, cat:crypto".to_owned(),
        };

        assert!(flag.has_tag("cat:web"));
        assert!(flag.has_tag("cat:crypto"));
        assert!(!flag.has_tag("cat:forensics"));
        assert!(!flag.has_tag("cat"));
    }

    #[test]
    fn update_emptiness() {
        assert!(UpdateFlag::default().is_empty());

        let update = UpdateFlag {
            value: Some(50),
            ..UpdateFlag::default()
        };
        assert!(!update.is_empty());
    }

    #[test]
    fn add_payload_rejects_id() {
        let err = serde_json::from_str::<NewTeam>(r#"{"id": 4, "name": "foo"}"#);
        assert!(err.is_err());
    }
}
