use warp::{reject::custom as reject, Filter, Rejection};

use crate::config::Config;
use crate::db::{Db, DbError, ProfileField};

use super::{auth, Error};

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SelfForm {
    name: Option<String>,
    country: Option<String>,
    website: Option<String>,
}

/// One-shot profile setup: a team fills in its own still-empty fields.
/// Each field can only ever be written once through this endpoint.
pub fn update_self() -> Resp!() {
    warp::ext::get::<Db>()
        .and(warp::ext::get::<Config>())
        .and(auth::team())
        .and(warp::body::json())
        .and_then(
            |db: Db, config: Config, team: i32, form: SelfForm| {
                if !config.teams.self_update {
                    return Err(reject(Error::BadRequest(
                        "Team self-update isn't allowed.".to_owned(),
                    )));
                }

                let fields = [
                    (ProfileField::Name, &form.name),
                    (ProfileField::Country, &form.country),
                    (ProfileField::Website, &form.website),
                ];
                for (field, value) in &fields {
                    if let Some(value) = value {
                        set_field(&db, team, *field, value)?;
                    }
                }

                info!("[team {:02}] Updated its profile", team);
                Ok::<_, Rejection>(warp::reply::json(&true))
            },
        )
        .boxed()
}

fn set_field(db: &Db, team: i32, field: ProfileField, value: &str) -> Result<(), Rejection> {
    match db.set_team_field_once(team, field, value) {
        Ok(()) => Ok(()),
        Err(err @ DbError::ProfileFieldTaken(_)) => {
            Err(reject(Error::BadRequest(err.to_string())))
        }
        Err(err) => Err(reject(Error::Db(err))),
    }
}
