diesel::table! {
    users (oid) {
        oid -> Int8,
        id -> Varchar,
        username -> Varchar,
        email -> Varchar,
        password_hash -> Varchar,
        bio -> Nullable<Text>,
        avatar -> Nullable<Varchar>,
        avatar_key -> Nullable<Varchar>,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

diesel::table! {
    tweets (oid) {
        oid -> Int8,
        id -> Varchar,
        user_oid -> Int8,
        image_url -> Varchar,
        image_key -> Varchar,
        text -> Nullable<Text>,
        created_at -> Timestamp,
    }
}

diesel::table! {
    comments (oid) {
        oid -> Int8,
        id -> Varchar,
        user_oid -> Int8,
        tweet_oid -> Int8,
        text -> Text,
        created_at -> Timestamp,
    }
}

diesel::table! {
    likes (oid) {
        oid -> Int8,
        id -> Varchar,
        user_oid -> Int8,
        tweet_oid -> Int8,
        created_at -> Timestamp,
    }
}

diesel::table! {
    follows (oid) {
        oid -> Int8,
        id -> Varchar,
        follower_oid -> Int8,
        followed_oid -> Int8,
        created_at -> Timestamp,
    }
}

diesel::joinable!(tweets -> users (user_oid));
diesel::joinable!(comments -> users (user_oid));
diesel::joinable!(comments -> tweets (tweet_oid));
diesel::joinable!(likes -> users (user_oid));
diesel::joinable!(likes -> tweets (tweet_oid));

diesel::allow_tables_to_appear_in_same_query!(users, tweets, comments, likes, follows,);
