use crate::application::notifications::NotificationDispatcher;
use crate::application::transition::{load, run_transition};
use crate::domain::chat::{Chat, ChatUpdate, LastMessage, Message, MessageUpdate};
use crate::domain::counter::{CounterDelta, CounterKey};
use crate::domain::lifecycle::Plan;
use crate::domain::notification::LifecycleEvent;
use crate::domain::ports::{
    ChangeSet, ClockRef, CounterStoreRef, Filter, Record, StoreRef, Subscription,
};
use crate::error::{MarketError, Result};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

/// Two-person chats with per-participant unread counters.
#[derive(Clone)]
pub struct ChatService {
    chats: StoreRef<Chat>,
    messages: StoreRef<Message>,
    counters: CounterStoreRef,
    notifier: NotificationDispatcher,
    clock: ClockRef,
    max_commit_attempts: u32,
}

impl ChatService {
    pub fn new(
        chats: StoreRef<Chat>,
        messages: StoreRef<Message>,
        counters: CounterStoreRef,
        notifier: NotificationDispatcher,
        clock: ClockRef,
        max_commit_attempts: u32,
    ) -> Self {
        Self {
            chats,
            messages,
            counters,
            notifier,
            clock,
            max_commit_attempts,
        }
    }

    /// The chat between `a` and `b`, created on first use.
    pub async fn open_chat(&self, a: &str, b: &str) -> Result<Chat> {
        let chat = Chat::between(a, b, self.clock.now())?;
        let existing = Chat::with_pair(a, b);
        if let Some(chat) = self.chats.query(&existing).await?.into_iter().next() {
            return Ok(chat);
        }
        match self.chats.create(chat, Vec::new()).await {
            Ok(chat) => {
                tracing::info!(chat_id = %chat.meta.id, a, b, "chat opened");
                Ok(chat)
            }
            // Lost the race to open the same pair; use the winner's chat.
            Err(MarketError::Conflict(_)) => self
                .chats
                .query(&existing)
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| {
                    MarketError::StoreUnavailable("chat vanished after conflict".into())
                }),
            Err(err) => Err(err),
        }
    }

    /// Appends a message, bumps the recipient's unread count in the same
    /// write, refreshes the chat summary and notifies the recipient.
    pub async fn send_message(
        &self,
        chat_id: &str,
        sender_id: &str,
        sender_name: &str,
        text: &str,
    ) -> Result<Message> {
        let chat = load(self.chats.as_ref(), chat_id).await?;
        let recipient_id = chat.counterpart(sender_id)?.to_string();
        let message = Message::new(chat_id, sender_id, sender_name, text, self.clock.now())?;

        let message = self
            .messages
            .create(
                message,
                vec![CounterDelta::new(CounterKey::unread(chat_id, &recipient_id), 1)],
            )
            .await?;

        let last = LastMessage {
            sender_id: sender_id.to_string(),
            text: message.text.clone(),
            sent_at: message.created_at,
        };
        run_transition(
            self.chats.as_ref(),
            chat_id,
            self.max_commit_attempts,
            |chat: &Chat| {
                let newer_on_file = chat
                    .last_message
                    .as_ref()
                    .is_some_and(|current| current.sent_at > last.sent_at);
                if newer_on_file {
                    Ok(Plan::Unchanged)
                } else {
                    Ok(Plan::apply(vec![ChatUpdate::LastMessage(last.clone())]))
                }
            },
        )
        .await?;

        tracing::debug!(chat_id, sender = sender_id, recipient = %recipient_id, "message sent");
        self.notifier.notify(LifecycleEvent::MessageSent {
            chat_id: chat_id.to_string(),
            recipient_id,
            sender_name: sender_name.to_string(),
            text: message.text.clone(),
        });
        Ok(message)
    }

    /// Marks `reader`'s unread messages in the chat as read.
    ///
    /// Each message flips together with a `-1` on the reader's unread count,
    /// so the counter drops by exactly the number of messages flipped even
    /// when two devices mark the same chat at once. Returns that number.
    pub async fn mark_read(&self, chat_id: &str, reader_id: &str) -> Result<u32> {
        let chat = load(self.chats.as_ref(), chat_id).await?;
        chat.counterpart(reader_id)?;

        let unread = self
            .messages
            .query(&Message::unread_by(chat_id, reader_id))
            .await?;
        let mut flipped = 0;
        for message in unread {
            let change = ChangeSet {
                expected_revision: message.revision(),
                updates: vec![MessageUpdate::MarkRead],
                counters: vec![CounterDelta::new(
                    CounterKey::unread(chat_id, reader_id),
                    -1,
                )],
            };
            match self.messages.commit(message.id(), change).await {
                Ok(_) => flipped += 1,
                // Another session flipped it first and took the decrement.
                Err(MarketError::Conflict(_)) => {}
                Err(err) => return Err(err),
            }
        }
        if flipped > 0 {
            tracing::debug!(chat_id, reader = reader_id, flipped, "messages marked read");
        }
        Ok(flipped)
    }

    /// All messages of the chat, oldest first.
    pub async fn messages(&self, chat_id: &str) -> Result<Vec<Message>> {
        self.messages.query(&Message::in_chat(chat_id)).await
    }

    pub async fn unread_count(&self, chat_id: &str, user_id: &str) -> Result<u64> {
        let value: Decimal = self
            .counters
            .value(&CounterKey::unread(chat_id, user_id))
            .await?;
        Ok(value.to_u64().unwrap_or_default())
    }

    pub async fn chats_for(&self, user_id: &str) -> Result<Vec<Chat>> {
        let user_id = user_id.to_string();
        self.chats
            .query(&Filter::new(move |chat: &Chat| chat.has_participant(&user_id)))
            .await
    }

    pub async fn observe_messages(&self, chat_id: &str) -> Result<Subscription<Message>> {
        self.messages.subscribe(Message::in_chat(chat_id)).await
    }
}
