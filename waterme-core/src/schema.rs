use diesel::{allow_tables_to_appear_in_same_query, table};

table! {
    plants (id) {
        id -> Text,
        user_id -> Text,
        name -> Text,
        watering_interval_days -> Integer,
        last_watered -> Timestamptz,
        fertilizing_interval_days -> Integer,
        last_fertilized -> Timestamptz,
        spray_interval_days -> Nullable<Integer>,
        last_misted -> Nullable<Timestamptz>,
        repotting_interval_days -> Nullable<Integer>,
        last_repotted -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
    }
}

table! {
    notification_configs (id) {
        id -> Text,
        user_id -> Text,
        enabled -> Bool,
        remind_watering -> Bool,
        remind_fertilizing -> Bool,
        remind_misting -> Bool,
        remind_repotting -> Bool,
        muted_item_ids -> Jsonb,
        registrations -> Jsonb,
        last_notification_sent_at -> Nullable<Timestamptz>,
        updated_at -> Timestamptz,
    }
}

allow_tables_to_appear_in_same_query!(plants, notification_configs);
