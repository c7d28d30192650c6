use super::Bot;
use crate::fatal;
use crate::prelude::*;
use crate::subscription::{ChannelId, MembershipOracle, MembershipStatus};
use crate::Result;
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{ChatMemberKind, Recipient};

/// Checks channel membership with `getChatMember`. The bot has to be an
/// administrator of the channel for this to work.
pub(crate) struct TgMembershipOracle {
    bot: Bot,
}

impl TgMembershipOracle {
    pub(crate) fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl MembershipOracle for TgMembershipOracle {
    #[instrument(skip(self))]
    async fn membership(&self, channel: &ChannelId, user_id: UserId) -> Result<MembershipStatus> {
        let recipient = match channel {
            ChannelId::Username(username) => Recipient::ChannelUsername(format!("@{username}")),
            ChannelId::Numeric(id) => Recipient::Id(ChatId(*id)),
            ChannelId::InviteLink(_) => {
                return Err(fatal!(
                    "Channel {channel} is known only by an invite link, its members can't be listed"
                ))
            }
        };

        let member = self.bot.get_chat_member(recipient, user_id).await?;

        Ok(membership_status(&member.kind))
    }
}

fn membership_status(kind: &ChatMemberKind) -> MembershipStatus {
    if kind.is_owner() {
        MembershipStatus::Creator
    } else if kind.is_administrator() {
        MembershipStatus::Administrator
    } else if kind.is_restricted() {
        if kind.is_present() {
            MembershipStatus::Restricted
        } else {
            MembershipStatus::Left
        }
    } else if kind.is_banned() {
        MembershipStatus::Kicked
    } else if kind.is_left() {
        MembershipStatus::Left
    } else {
        MembershipStatus::Member
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use teloxide::types::ChatMember;

    const ADMIN_RIGHTS: [&str; 15] = [
        "can_be_edited",
        "can_manage_chat",
        "can_change_info",
        "can_post_messages",
        "can_edit_messages",
        "can_delete_messages",
        "can_manage_video_chats",
        "can_invite_users",
        "can_restrict_members",
        "can_pin_messages",
        "can_manage_topics",
        "can_promote_members",
        "can_post_stories",
        "can_edit_stories",
        "can_delete_stories",
    ];

    const RESTRICTIONS: [&str; 16] = [
        "can_send_messages",
        "can_send_media_messages",
        "can_send_audios",
        "can_send_documents",
        "can_send_photos",
        "can_send_videos",
        "can_send_video_notes",
        "can_send_voice_notes",
        "can_send_polls",
        "can_send_other_messages",
        "can_add_web_page_previews",
        "can_change_info",
        "can_invite_users",
        "can_pin_messages",
        "can_manage_topics",
        "can_manage_video_chats",
    ];

    fn member(status: &str, fields: serde_json::Value) -> ChatMemberKind {
        let mut member = json!({
            "user": { "id": 42, "is_bot": false, "first_name": "Star" },
            "status": status,
        });
        member
            .as_object_mut()
            .unwrap()
            .extend(fields.as_object().unwrap().clone());

        serde_json::from_value::<ChatMember>(member).unwrap().kind
    }

    fn with_flags(flags: &[&str], value: bool, extra: serde_json::Value) -> serde_json::Value {
        let mut fields = extra;
        let object = fields.as_object_mut().unwrap();
        for flag in flags {
            object.insert((*flag).to_owned(), json!(value));
        }
        fields
    }

    fn restricted(is_member: bool) -> ChatMemberKind {
        member(
            "restricted",
            with_flags(
                &RESTRICTIONS,
                false,
                json!({ "is_member": is_member, "until_date": 0 }),
            ),
        )
    }

    #[test]
    fn chat_member_kinds_map_to_membership() {
        let owner = member("creator", json!({ "is_anonymous": false }));
        let admin = member(
            "administrator",
            with_flags(&ADMIN_RIGHTS, true, json!({ "is_anonymous": false })),
        );
        let banned = member("kicked", json!({ "until_date": 0 }));

        let cases = [
            (owner, MembershipStatus::Creator),
            (admin, MembershipStatus::Administrator),
            (member("member", json!({})), MembershipStatus::Member),
            (restricted(true), MembershipStatus::Restricted),
            (restricted(false), MembershipStatus::Left),
            (member("left", json!({})), MembershipStatus::Left),
            (banned, MembershipStatus::Kicked),
        ];

        for (kind, expected) in cases {
            assert_eq!(membership_status(&kind), expected, "{kind:?}");
        }
    }

    #[test]
    fn absent_members_are_not_subscribed() {
        assert!(!membership_status(&restricted(false)).is_subscribed());
        assert!(membership_status(&restricted(true)).is_subscribed());
        assert!(!membership_status(&member("kicked", json!({ "until_date": 0 }))).is_subscribed());
    }
}
