diesel::table! {
    billables (id) {
        id -> Int4,
        created_at -> Int8,
        updated_at -> Int8,
        email -> Text,
        name -> Nullable<Text>,
        processor -> Text,
        processor_id -> Nullable<Text>,
        card_type -> Nullable<Text>,
        card_last4 -> Nullable<Text>,
        card_exp_month -> Nullable<Int4>,
        card_exp_year -> Nullable<Int4>,
    }
}

diesel::table! {
    pay_charges (id) {
        id -> Int4,
        created_at -> Int8,
        billable_id -> Int4,
        processor -> Text,
        processor_id -> Text,
        amount -> Int8,
        currency -> Text,
        card_type -> Nullable<Text>,
        card_last4 -> Nullable<Text>,
    }
}

diesel::table! {
    pay_subscriptions (id) {
        id -> Int4,
        created_at -> Int8,
        updated_at -> Int8,
        billable_id -> Int4,
        name -> Text,
        processor -> Text,
        processor_id -> Text,
        processor_plan -> Text,
        trial_ends_at -> Nullable<Int8>,
        ends_at -> Nullable<Int8>,
        status -> Text,
    }
}

diesel::joinable!(pay_charges -> billables (billable_id));
diesel::joinable!(pay_subscriptions -> billables (billable_id));

diesel::allow_tables_to_appear_in_same_query!(billables, pay_charges, pay_subscriptions,);
