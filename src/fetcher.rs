//! Pull the raw lookup responses for every configured account and post
use log::{debug, info};
use serde_json::Value;

use crate::error::PipelineError;
use crate::twitter_client::TwitterClientTrait;

/// Raw responses in the same order as the configured ids
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RawResponses {
    pub users: Vec<Value>,
    pub tweets: Vec<Value>,
}

/// One request per id, sequentially, users first
///
/// Payloads are not validated here. An error object returned by the API ends up in the list
/// and is rejected later by the transformer.
pub fn fetch_raw(
    tw_client: &impl TwitterClientTrait,
    user_ids: &[String],
    tweet_ids: &[String],
) -> Result<RawResponses, PipelineError> {
    info!(
        "Pull {} users and {} tweets",
        user_ids.len(),
        tweet_ids.len()
    );

    let mut users = Vec::with_capacity(user_ids.len());
    for user_id in user_ids {
        let response = tw_client.fetch_user(user_id)?;
        debug!("user {}: {}", user_id, response);
        users.push(response);
    }

    let mut tweets = Vec::with_capacity(tweet_ids.len());
    for tweet_id in tweet_ids {
        let response = tw_client.fetch_tweet(tweet_id)?;
        debug!("tweet {}: {}", tweet_id, response);
        tweets.push(response);
    }

    Ok(RawResponses { users, tweets })
}

#[cfg(test)]
mod tests {
    use mockall::Sequence;
    use serde_json::json;

    use super::fetch_raw;
    use crate::error::PipelineError;
    use crate::twitter_client::MockTwitterClientTrait;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn keeps_the_configured_order() {
        let mut tw_client = MockTwitterClientTrait::default();
        let mut seq = Sequence::new();
        for id in ["2", "1"] {
            tw_client
                .expect_fetch_user()
                .withf(move |user_id| user_id == id)
                .times(1)
                .in_sequence(&mut seq)
                .returning(|user_id| Ok(json!({ "data": { "id": user_id } })));
        }
        tw_client
            .expect_fetch_tweet()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|tweet_id| Ok(json!({ "data": { "id": tweet_id } })));

        let result = fetch_raw(&tw_client, &ids(&["2", "1"]), &ids(&["9"])).unwrap();
        assert_eq!(result.users[0]["data"]["id"], "2");
        assert_eq!(result.users[1]["data"]["id"], "1");
        assert_eq!(result.tweets, vec![json!({ "data": { "id": "9" } })]);
    }

    #[test]
    fn passes_error_payloads_through() {
        let mut tw_client = MockTwitterClientTrait::default();
        let not_found = json!({
            "errors": [{
                "title": "Not Found Error",
                "detail": "Could not find user with id: [3]."
            }]
        });
        let payload = not_found.clone();
        tw_client
            .expect_fetch_user()
            .returning(move |_| Ok(payload.clone()));

        let result = fetch_raw(&tw_client, &ids(&["3"]), &[]).unwrap();
        assert_eq!(result.users, vec![not_found]);
        assert!(result.tweets.is_empty());
    }

    #[test]
    fn transport_failure_stops_the_fetch() {
        let mut tw_client = MockTwitterClientTrait::default();
        tw_client.expect_fetch_user().returning(|_| {
            Err(PipelineError::UpstreamApi {
                url: "https://api.twitter.com/2/users/1".to_string(),
                reason: "timed out".to_string(),
            })
        });
        tw_client.expect_fetch_tweet().times(0);

        let result = fetch_raw(&tw_client, &ids(&["1", "2"]), &ids(&["9"]));
        assert!(matches!(result, Err(PipelineError::UpstreamApi { .. })));
    }

    #[test]
    fn nothing_configured_means_no_requests() {
        let tw_client = MockTwitterClientTrait::default();
        let result = fetch_raw(&tw_client, &[], &[]).unwrap();
        assert_eq!(result.users.len() + result.tweets.len(), 0);
    }
}
