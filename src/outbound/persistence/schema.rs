//! Diesel table definitions for the PostgreSQL schema.
//!
//! These definitions must match the migrations exactly; Diesel uses them
//! for compile-time query validation and type-safe SQL generation.

diesel::table! {
    /// Registered users.
    users (id) {
        id -> Int4,
        name -> Varchar,
        /// Optional and unique; blank submissions are stored as NULL so
        /// the constraint only binds real addresses.
        email -> Nullable<Varchar>,
        /// 256-bit random hex secret, unique.
        api_key -> Varchar,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// OAuth identity bindings. One per `(user_id, source)`; a provider
    /// identity `(source, source_id)` links exactly one user.
    auths (id) {
        id -> Int4,
        user_id -> Int4,
        source -> Varchar,
        source_id -> Varchar,
        access_token -> Varchar,
        refresh_token -> Varchar,
        expiry -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// Dials and their derived aggregate value.
    dials (id) {
        id -> Int4,
        user_id -> Int4,
        name -> Varchar,
        invite_code -> Varchar,
        value -> Int4,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// Per-minute dial value history. At most one row per dial per minute
    /// bucket; writers upsert on the composite key.
    dial_values (dial_id, timestamp) {
        dial_id -> Int4,
        timestamp -> Timestamptz,
        value -> Int4,
    }
}

diesel::table! {
    /// Member contributions, unique per `(dial_id, user_id)`.
    dial_memberships (id) {
        id -> Int4,
        dial_id -> Int4,
        user_id -> Int4,
        value -> Int4,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::joinable!(auths -> users (user_id));
diesel::joinable!(dials -> users (user_id));
diesel::joinable!(dial_values -> dials (dial_id));
diesel::joinable!(dial_memberships -> dials (dial_id));
diesel::joinable!(dial_memberships -> users (user_id));

diesel::allow_tables_to_appear_in_same_query!(users, auths, dials, dial_values, dial_memberships);
