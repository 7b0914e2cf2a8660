table! {
    flags (id) {
        id -> Int4,
        teamid -> Nullable<Int4>,
        triggerid -> Nullable<Int4>,
        code -> Nullable<Varchar>,
        flag -> Nullable<Varchar>,
        value -> Int4,
        writeup_value -> Nullable<Int4>,
        return_string -> Nullable<Varchar>,
        counter -> Nullable<Int4>,
        validator -> Nullable<Varchar>,
        description -> Varchar,
        tags -> Varchar,
    }
}

table! {
    scores (id) {
        id -> Int4,
        teamid -> Int4,
        flagid -> Int4,
        value -> Int4,
        writeup_value -> Nullable<Int4>,
        submit_time -> Timestamp,
        writeup_time -> Nullable<Timestamp>,
    }
}

table! {
    teams (id) {
        id -> Int4,
        name -> Varchar,
        country -> Varchar,
        website -> Varchar,
        subnets -> Varchar,
        notes -> Varchar,
    }
}

table! {
    triggers (id) {
        id -> Int4,
        flagid -> Int4,
        count -> Varchar,
        description -> Varchar,
    }
}

joinable!(scores -> flags (flagid));
joinable!(scores -> teams (teamid));
joinable!(flags -> teams (teamid));
joinable!(triggers -> flags (flagid));

allow_tables_to_appear_in_same_query!(flags, scores, teams, triggers,);
