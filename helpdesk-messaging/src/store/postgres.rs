use std::collections::HashMap;

use chrono::{DateTime, Utc};
use diesel::dsl::{exists, not};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, PooledConnection};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use uuid::Uuid;

use helpdesk_shared::clients::db::DbPool;
use helpdesk_shared::errors::{AppError, AppResult, ErrorCode};

use super::rows::{
    group_reactions, AttachmentRow, ConversationChanges, ConversationRow, MessageRow, MuteRow, NewConversationRow,
    ParticipantRow, ReactionRow, ReceiptRow,
};
use super::{
    conversation_inactive, conversation_not_found, direct_pair_taken, like_pattern, message_not_found, not_a_member,
};
use super::{ConversationStore, MessageStore, Store};
use crate::models::{
    direct_key, is_group_size, last_message_preview, Conversation, ConversationUpdate, DeliveryStatus, Message,
    MessageType, MuteSetting, NewConversation, NewMessage, ReadReceipt, TOMBSTONE_TEXT,
};
use crate::schema::{
    conversation_mutes, conversation_participants, conversations, message_attachments, message_reactions,
    message_read_receipts, messages,
};

type PgPooled = PooledConnection<ConnectionManager<PgConnection>>;

/// Store backed by PostgreSQL through an r2d2 pool.
///
/// Every multi-statement operation runs in one transaction; rows that gate a
/// decision are locked with `FOR UPDATE`.
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> AppResult<PgPooled> {
        self.pool.get().map_err(|e| AppError::Internal(e.into()))
    }
}

/// The partial unique index on active direct pairs is the only unique
/// constraint a conversation write can hit.
fn map_unique_violation(err: DieselError) -> AppError {
    match err {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => direct_pair_taken(),
        other => AppError::Database(other),
    }
}

// --- Conversation helpers ---

fn lock_conversation(conn: &mut PgConnection, id: Uuid) -> AppResult<ConversationRow> {
    conversations::table
        .find(id)
        .for_update()
        .select(ConversationRow::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(conversation_not_found)
}

fn hydrate_conversations(conn: &mut PgConnection, rows: Vec<ConversationRow>) -> AppResult<Vec<Conversation>> {
    let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();

    let participants: Vec<ParticipantRow> = conversation_participants::table
        .filter(conversation_participants::conversation_id.eq_any(&ids))
        .order((conversation_participants::joined_at.asc(), conversation_participants::user_id.asc()))
        .select(ParticipantRow::as_select())
        .load(conn)?;
    let mutes: Vec<MuteRow> = conversation_mutes::table
        .filter(conversation_mutes::conversation_id.eq_any(&ids))
        .select(MuteRow::as_select())
        .load(conn)?;

    let mut members: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for p in participants {
        members.entry(p.conversation_id).or_default().push(p.user_id);
    }
    let mut muted: HashMap<Uuid, Vec<MuteSetting>> = HashMap::new();
    for m in mutes {
        muted.entry(m.conversation_id).or_default().push(MuteSetting {
            user_id: m.user_id,
            muted_until: m.muted_until,
        });
    }

    Ok(rows
        .into_iter()
        .map(|row| {
            let participants = members.remove(&row.id).unwrap_or_default();
            let mutes = muted.remove(&row.id).unwrap_or_default();
            row.into_conversation(participants, mutes)
        })
        .collect())
}

fn load_conversation(conn: &mut PgConnection, id: Uuid) -> AppResult<Option<Conversation>> {
    let row = conversations::table
        .find(id)
        .select(ConversationRow::as_select())
        .first(conn)
        .optional()?;
    match row {
        Some(row) => Ok(hydrate_conversations(conn, vec![row])?.pop()),
        None => Ok(None),
    }
}

fn require_conversation(conn: &mut PgConnection, id: Uuid) -> AppResult<Conversation> {
    load_conversation(conn, id)?.ok_or_else(conversation_not_found)
}

fn participant_ids(conn: &mut PgConnection, id: Uuid) -> AppResult<Vec<Uuid>> {
    Ok(conversation_participants::table
        .filter(conversation_participants::conversation_id.eq(id))
        .select(conversation_participants::user_id)
        .load(conn)?)
}

/// Write `is_group` and `direct_key` for the given membership.
fn classify(conn: &mut PgConnection, id: Uuid, members: &[Uuid]) -> AppResult<()> {
    let key = match members {
        [a, b] => Some(direct_key(*a, *b)),
        _ => None,
    };
    diesel::update(conversations::table.find(id))
        .set((
            conversations::is_group.eq(is_group_size(members.len())),
            conversations::direct_key.eq(key),
            conversations::updated_at.eq(Utc::now()),
        ))
        .execute(conn)
        .map_err(map_unique_violation)?;
    Ok(())
}

// --- Message helpers ---

fn hydrate_messages(conn: &mut PgConnection, rows: Vec<MessageRow>) -> AppResult<Vec<Message>> {
    let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();

    let attachments: Vec<AttachmentRow> = message_attachments::table
        .filter(message_attachments::message_id.eq_any(&ids))
        .order((message_attachments::message_id.asc(), message_attachments::position.asc()))
        .select(AttachmentRow::as_select())
        .load(conn)?;
    let reactions: Vec<ReactionRow> = message_reactions::table
        .filter(message_reactions::message_id.eq_any(&ids))
        .order(message_reactions::created_at.asc())
        .select(ReactionRow::as_select())
        .load(conn)?;
    let receipts: Vec<ReceiptRow> = message_read_receipts::table
        .filter(message_read_receipts::message_id.eq_any(&ids))
        .order(message_read_receipts::read_at.asc())
        .select(ReceiptRow::as_select())
        .load(conn)?;

    let mut attachments_by: HashMap<Uuid, Vec<_>> = HashMap::new();
    for a in attachments {
        attachments_by.entry(a.message_id).or_default().push(a.into_attachment());
    }
    let mut reactions_by: HashMap<Uuid, Vec<ReactionRow>> = HashMap::new();
    for r in reactions {
        reactions_by.entry(r.message_id).or_default().push(r);
    }
    let mut receipts_by: HashMap<Uuid, Vec<ReadReceipt>> = HashMap::new();
    for r in receipts {
        receipts_by.entry(r.message_id).or_default().push(ReadReceipt {
            user_id: r.user_id,
            read_at: r.read_at,
        });
    }

    rows.into_iter()
        .map(|row| {
            let id = row.id;
            row.into_message(
                attachments_by.remove(&id).unwrap_or_default(),
                group_reactions(reactions_by.remove(&id).unwrap_or_default()),
                receipts_by.remove(&id).unwrap_or_default(),
            )
        })
        .collect()
}

fn load_message(conn: &mut PgConnection, id: Uuid) -> AppResult<Option<Message>> {
    let row = messages::table
        .find(id)
        .select(MessageRow::as_select())
        .first(conn)
        .optional()?;
    match row {
        Some(row) => Ok(hydrate_messages(conn, vec![row])?.pop()),
        None => Ok(None),
    }
}

fn require_message(conn: &mut PgConnection, id: Uuid) -> AppResult<Message> {
    load_message(conn, id)?.ok_or_else(message_not_found)
}

fn lock_message(conn: &mut PgConnection, id: Uuid) -> AppResult<MessageRow> {
    messages::table
        .find(id)
        .for_update()
        .select(MessageRow::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(message_not_found)
}

/// Recompute the conversation preview from its latest non-system message.
fn refresh_last_message(conn: &mut PgConnection, conversation_id: Uuid) -> AppResult<()> {
    let latest: Option<MessageRow> = messages::table
        .filter(messages::conversation_id.eq(conversation_id))
        .filter(messages::message_type.ne(MessageType::System.as_str()))
        .order((messages::created_at.desc(), messages::id.desc()))
        .select(MessageRow::as_select())
        .first(conn)
        .optional()?;

    let (preview, at) = match latest {
        Some(row) => {
            let kind: MessageType = row.message_type.parse().map_err(AppError::internal)?;
            (Some(last_message_preview(kind, &row.body)), Some(row.created_at))
        }
        None => (None, None),
    };

    diesel::update(conversations::table.find(conversation_id))
        .set((conversations::last_message.eq(preview), conversations::last_message_at.eq(at)))
        .execute(conn)?;
    Ok(())
}

fn message_deleted() -> AppError {
    AppError::new(ErrorCode::MessageDeleted, "message has been deleted")
}

impl ConversationStore for PgStore {
    fn conversation(&self, id: Uuid) -> AppResult<Option<Conversation>> {
        let mut conn = self.conn()?;
        load_conversation(&mut conn, id)
    }

    fn find_active_direct(&self, tenant_id: Uuid, key: &str) -> AppResult<Option<Conversation>> {
        let mut conn = self.conn()?;
        let row = conversations::table
            .filter(conversations::tenant_id.eq(tenant_id))
            .filter(conversations::direct_key.eq(key))
            .filter(conversations::is_active.eq(true))
            .filter(conversations::is_group.eq(false))
            .select(ConversationRow::as_select())
            .first(&mut conn)
            .optional()?;
        match row {
            Some(row) => Ok(hydrate_conversations(&mut conn, vec![row])?.pop()),
            None => Ok(None),
        }
    }

    fn insert_conversation(&self, new: NewConversation) -> AppResult<Conversation> {
        let mut conn = self.conn()?;
        conn.transaction::<_, AppError, _>(|conn| {
            let id = Uuid::now_v7();
            let now = Utc::now();
            let key = new.direct_key();

            diesel::insert_into(conversations::table)
                .values(&NewConversationRow {
                    id,
                    tenant_id: new.tenant_id,
                    title: &new.title,
                    creator_id: new.creator_id,
                    is_group: new.is_group(),
                    description: new.description.as_deref(),
                    direct_key: key.as_deref(),
                    created_at: now,
                    updated_at: now,
                })
                .execute(conn)
                .map_err(map_unique_violation)?;

            let members: Vec<ParticipantRow> = new
                .participants
                .iter()
                .map(|user_id| ParticipantRow {
                    conversation_id: id,
                    user_id: *user_id,
                    joined_at: now,
                })
                .collect();
            diesel::insert_into(conversation_participants::table)
                .values(&members)
                .execute(conn)?;

            require_conversation(conn, id)
        })
    }

    fn add_participant(&self, id: Uuid, user_id: Uuid) -> AppResult<Conversation> {
        let mut conn = self.conn()?;
        conn.transaction::<_, AppError, _>(|conn| {
            lock_conversation(conn, id)?;
            let mut members = participant_ids(conn, id)?;
            if members.contains(&user_id) {
                return Err(AppError::new(ErrorCode::AlreadyParticipant, "user is already a participant"));
            }

            diesel::insert_into(conversation_participants::table)
                .values(&ParticipantRow {
                    conversation_id: id,
                    user_id,
                    joined_at: Utc::now(),
                })
                .execute(conn)?;
            members.push(user_id);
            classify(conn, id, &members)?;

            require_conversation(conn, id)
        })
    }

    fn remove_participant(&self, id: Uuid, user_id: Uuid) -> AppResult<Conversation> {
        let mut conn = self.conn()?;
        conn.transaction::<_, AppError, _>(|conn| {
            lock_conversation(conn, id)?;
            let members = participant_ids(conn, id)?;
            if !members.contains(&user_id) {
                return Err(AppError::not_found("participant not found"));
            }
            let remaining: Vec<Uuid> = members.into_iter().filter(|p| *p != user_id).collect();
            if remaining.len() < 2 {
                return Err(AppError::new(
                    ErrorCode::ValidationError,
                    "a conversation must keep at least two participants",
                ));
            }

            diesel::delete(
                conversation_participants::table
                    .filter(conversation_participants::conversation_id.eq(id))
                    .filter(conversation_participants::user_id.eq(user_id)),
            )
            .execute(conn)?;
            diesel::delete(
                conversation_mutes::table
                    .filter(conversation_mutes::conversation_id.eq(id))
                    .filter(conversation_mutes::user_id.eq(user_id)),
            )
            .execute(conn)?;
            classify(conn, id, &remaining)?;

            require_conversation(conn, id)
        })
    }

    fn update_conversation(&self, id: Uuid, update: &ConversationUpdate) -> AppResult<Conversation> {
        let mut conn = self.conn()?;
        let changes = ConversationChanges {
            title: update.title.as_deref(),
            description: update
                .description
                .as_deref()
                .map(|d| (!d.is_empty()).then_some(d)),
            updated_at: Utc::now(),
        };

        let updated = diesel::update(conversations::table.find(id))
            .set(&changes)
            .execute(&mut conn)?;
        if updated == 0 {
            return Err(conversation_not_found());
        }
        require_conversation(&mut conn, id)
    }

    fn deactivate_conversation(&self, id: Uuid) -> AppResult<Conversation> {
        let mut conn = self.conn()?;
        let updated = diesel::update(conversations::table.find(id))
            .set((conversations::is_active.eq(false), conversations::updated_at.eq(Utc::now())))
            .execute(&mut conn)?;
        if updated == 0 {
            return Err(conversation_not_found());
        }
        require_conversation(&mut conn, id)
    }

    fn delete_conversation(&self, id: Uuid) -> AppResult<u64> {
        let mut conn = self.conn()?;
        conn.transaction::<_, AppError, _>(|conn| {
            lock_conversation(conn, id)?;
            let removed = diesel::delete(messages::table.filter(messages::conversation_id.eq(id))).execute(conn)?;
            diesel::delete(conversations::table.find(id)).execute(conn)?;
            Ok(removed as u64)
        })
    }

    fn set_mute(&self, id: Uuid, user_id: Uuid, muted_until: Option<DateTime<Utc>>) -> AppResult<Conversation> {
        let mut conn = self.conn()?;
        conn.transaction::<_, AppError, _>(|conn| {
            lock_conversation(conn, id)?;
            diesel::insert_into(conversation_mutes::table)
                .values(&MuteRow {
                    conversation_id: id,
                    user_id,
                    muted_until,
                })
                .on_conflict((conversation_mutes::conversation_id, conversation_mutes::user_id))
                .do_update()
                .set(conversation_mutes::muted_until.eq(muted_until))
                .execute(conn)?;
            require_conversation(conn, id)
        })
    }

    fn clear_mute(&self, id: Uuid, user_id: Uuid) -> AppResult<Conversation> {
        let mut conn = self.conn()?;
        diesel::delete(
            conversation_mutes::table
                .filter(conversation_mutes::conversation_id.eq(id))
                .filter(conversation_mutes::user_id.eq(user_id)),
        )
        .execute(&mut conn)?;
        require_conversation(&mut conn, id)
    }

    fn conversations_for_user(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        offset: u64,
        limit: u64,
    ) -> AppResult<(Vec<Conversation>, u64)> {
        let ids = self.active_conversation_ids(tenant_id, user_id)?;
        let total = ids.len() as u64;

        let mut conn = self.conn()?;
        let rows: Vec<ConversationRow> = conversations::table
            .filter(conversations::id.eq_any(&ids))
            .order((conversations::last_message_at.desc().nulls_last(), conversations::created_at.desc()))
            .offset(i64::try_from(offset).unwrap_or(i64::MAX))
            .limit(limit as i64)
            .select(ConversationRow::as_select())
            .load(&mut conn)?;

        Ok((hydrate_conversations(&mut conn, rows)?, total))
    }

    fn active_conversation_ids(&self, tenant_id: Uuid, user_id: Uuid) -> AppResult<Vec<Uuid>> {
        let mut conn = self.conn()?;
        Ok(conversations::table
            .inner_join(conversation_participants::table)
            .filter(conversations::tenant_id.eq(tenant_id))
            .filter(conversations::is_active.eq(true))
            .filter(conversation_participants::user_id.eq(user_id))
            .select(conversations::id)
            .load(&mut conn)?)
    }

    fn search_conversations(&self, tenant_id: Uuid, user_id: Uuid, term: &str) -> AppResult<Vec<Conversation>> {
        let ids = self.active_conversation_ids(tenant_id, user_id)?;
        let pattern = like_pattern(term);

        let mut conn = self.conn()?;
        let rows: Vec<ConversationRow> = conversations::table
            .filter(conversations::id.eq_any(&ids))
            .filter(
                conversations::title
                    .ilike(&pattern)
                    .or(conversations::description.ilike(&pattern)),
            )
            .order((conversations::last_message_at.desc().nulls_last(), conversations::created_at.desc()))
            .select(ConversationRow::as_select())
            .load(&mut conn)?;

        hydrate_conversations(&mut conn, rows)
    }
}

impl MessageStore for PgStore {
    fn message(&self, id: Uuid) -> AppResult<Option<Message>> {
        let mut conn = self.conn()?;
        load_message(&mut conn, id)
    }

    fn append_message(&self, new: NewMessage) -> AppResult<Message> {
        let mut conn = self.conn()?;
        conn.transaction::<_, AppError, _>(|conn| {
            let conversation = lock_conversation(conn, new.conversation_id)?;
            // Membership may have changed since the caller was authorized.
            if new.message_type != MessageType::System {
                if !conversation.is_active {
                    return Err(conversation_inactive());
                }
                if !participant_ids(conn, new.conversation_id)?.contains(&new.sender_id) {
                    return Err(not_a_member());
                }
            }

            let message = new.into_message(Uuid::now_v7(), Utc::now());
            diesel::insert_into(messages::table)
                .values(&MessageRow::from_message(&message))
                .execute(conn)?;

            if !message.attachments.is_empty() {
                let rows: Vec<AttachmentRow> = message
                    .attachments
                    .iter()
                    .enumerate()
                    .map(|(position, a)| AttachmentRow::new(message.id, position, a))
                    .collect();
                diesel::insert_into(message_attachments::table)
                    .values(&rows)
                    .execute(conn)?;
            }

            if message.message_type != MessageType::System {
                diesel::update(conversations::table.find(message.conversation_id))
                    .set((
                        conversations::last_message.eq(message.preview()),
                        conversations::last_message_at.eq(message.created_at),
                        conversations::updated_at.eq(message.created_at),
                    ))
                    .execute(conn)?;
            }

            Ok(message)
        })
    }

    fn edit_message(&self, id: Uuid, text: &str, edited_at: DateTime<Utc>) -> AppResult<Message> {
        let mut conn = self.conn()?;
        let updated = diesel::update(messages::table.find(id).filter(messages::is_deleted.eq(false)))
            .set((
                messages::body.eq(text),
                messages::is_edited.eq(true),
                messages::edited_at.eq(edited_at),
                messages::updated_at.eq(edited_at),
            ))
            .execute(&mut conn)?;

        let message = require_message(&mut conn, id)?;
        if updated == 0 {
            return Err(message_deleted());
        }
        Ok(message)
    }

    fn tombstone_message(&self, id: Uuid, deleted_by: Uuid, deleted_at: DateTime<Utc>) -> AppResult<Message> {
        let mut conn = self.conn()?;
        conn.transaction::<_, AppError, _>(|conn| {
            // Conversation before message, the order `delete_conversation` locks in.
            let conversation_id: Uuid = messages::table
                .find(id)
                .select(messages::conversation_id)
                .first(conn)
                .optional()?
                .ok_or_else(message_not_found)?;
            lock_conversation(conn, conversation_id)?;
            let row = lock_message(conn, id)?;

            if !row.is_deleted {
                diesel::update(messages::table.find(id))
                    .set((
                        messages::body.eq(TOMBSTONE_TEXT),
                        messages::is_deleted.eq(true),
                        messages::deleted_at.eq(deleted_at),
                        messages::deleted_by.eq(deleted_by),
                        messages::updated_at.eq(deleted_at),
                    ))
                    .execute(conn)?;
                diesel::delete(message_attachments::table.filter(message_attachments::message_id.eq(id)))
                    .execute(conn)?;
            }

            if row.message_type != MessageType::System.as_str() {
                refresh_last_message(conn, row.conversation_id)?;
            }

            require_message(conn, id)
        })
    }

    fn add_reaction(&self, id: Uuid, emoji: &str, user_id: Uuid) -> AppResult<Message> {
        let mut conn = self.conn()?;
        conn.transaction::<_, AppError, _>(|conn| {
            if lock_message(conn, id)?.is_deleted {
                return Err(message_deleted());
            }
            diesel::insert_into(message_reactions::table)
                .values(&ReactionRow {
                    message_id: id,
                    emoji: emoji.to_string(),
                    user_id,
                    created_at: Utc::now(),
                })
                .on_conflict_do_nothing()
                .execute(conn)?;
            require_message(conn, id)
        })
    }

    fn remove_reaction(&self, id: Uuid, emoji: &str, user_id: Uuid) -> AppResult<Message> {
        let mut conn = self.conn()?;
        diesel::delete(
            message_reactions::table
                .filter(message_reactions::message_id.eq(id))
                .filter(message_reactions::emoji.eq(emoji))
                .filter(message_reactions::user_id.eq(user_id)),
        )
        .execute(&mut conn)?;
        require_message(&mut conn, id)
    }

    fn mark_read(&self, conversation_id: Uuid, user_id: Uuid, read_at: DateTime<Utc>) -> AppResult<u64> {
        let mut conn = self.conn()?;
        conn.transaction::<_, AppError, _>(|conn| {
            let unread: Vec<Uuid> = messages::table
                .filter(messages::conversation_id.eq(conversation_id))
                .filter(messages::sender_id.ne(user_id))
                .filter(not(exists(
                    message_read_receipts::table
                        .filter(message_read_receipts::message_id.eq(messages::id))
                        .filter(message_read_receipts::user_id.eq(user_id)),
                )))
                .select(messages::id)
                .load(conn)?;
            if unread.is_empty() {
                return Ok(0);
            }

            let receipts: Vec<ReceiptRow> = unread
                .iter()
                .map(|message_id| ReceiptRow {
                    message_id: *message_id,
                    user_id,
                    read_at,
                })
                .collect();
            let inserted = diesel::insert_into(message_read_receipts::table)
                .values(&receipts)
                .on_conflict_do_nothing()
                .execute(conn)?;

            diesel::update(messages::table.filter(messages::id.eq_any(&unread)))
                .set(messages::status.eq(DeliveryStatus::Read.as_str()))
                .execute(conn)?;

            Ok(inserted as u64)
        })
    }

    fn mark_delivered(&self, conversation_id: Uuid, user_id: Uuid) -> AppResult<u64> {
        let mut conn = self.conn()?;
        let raised = diesel::update(
            messages::table
                .filter(messages::conversation_id.eq(conversation_id))
                .filter(messages::sender_id.ne(user_id))
                .filter(messages::status.eq(DeliveryStatus::Sent.as_str())),
        )
        .set(messages::status.eq(DeliveryStatus::Delivered.as_str()))
        .execute(&mut conn)?;
        Ok(raised as u64)
    }

    fn unread_count(&self, conversation_id: Uuid, user_id: Uuid) -> AppResult<u64> {
        let mut conn = self.conn()?;
        let count: i64 = messages::table
            .filter(messages::conversation_id.eq(conversation_id))
            .filter(messages::sender_id.ne(user_id))
            .filter(not(exists(
                message_read_receipts::table
                    .filter(message_read_receipts::message_id.eq(messages::id))
                    .filter(message_read_receipts::user_id.eq(user_id)),
            )))
            .count()
            .get_result(&mut conn)?;
        Ok(count as u64)
    }

    fn messages_page(&self, conversation_id: Uuid, before: Option<DateTime<Utc>>, limit: u64) -> AppResult<Vec<Message>> {
        let mut conn = self.conn()?;
        let mut query = messages::table
            .filter(messages::conversation_id.eq(conversation_id))
            .select(MessageRow::as_select())
            .into_boxed();
        if let Some(cursor) = before {
            query = query.filter(messages::created_at.lt(cursor));
        }

        let rows = query
            .order((messages::created_at.desc(), messages::id.desc()))
            .limit(limit as i64)
            .load(&mut conn)?;
        hydrate_messages(&mut conn, rows)
    }

    fn search_messages(
        &self,
        tenant_id: Uuid,
        conversation_ids: &[Uuid],
        term: &str,
        limit: u64,
    ) -> AppResult<Vec<Message>> {
        let mut conn = self.conn()?;
        let rows = messages::table
            .filter(messages::tenant_id.eq(tenant_id))
            .filter(messages::conversation_id.eq_any(conversation_ids))
            .filter(messages::is_deleted.eq(false))
            .filter(messages::body.ilike(like_pattern(term)))
            .order((messages::created_at.desc(), messages::id.desc()))
            .limit(limit as i64)
            .select(MessageRow::as_select())
            .load(&mut conn)?;
        hydrate_messages(&mut conn, rows)
    }
}

impl Store for PgStore {
    fn ping(&self) -> AppResult<()> {
        let mut conn = self.conn()?;
        diesel::sql_query("SELECT 1").execute(&mut conn)?;
        Ok(())
    }
}
