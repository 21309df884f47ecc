//! Property tests for in-memory vector store search and upsert.

use chrono::Utc;
use proptest::prelude::*;
use ragline::document::{ChunkPayload, PointId, UserId, VectorPoint};
use ragline::filter::{SearchFilter, SearchOptions};
use ragline::inmemory::InMemoryVectorStore;
use ragline::vectorstore::VectorStore;
use tokio_util::sync::CancellationToken;

const DIM: usize = 16;
const USERS: [&str; 3] = ["alice", "bob", "carol"];

/// Generate a non-zero L2-normalized embedding of the given dimension.
fn arb_normalized_embedding(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-1.0f32..1.0f32, dim).prop_filter_map(
        "non-zero embedding",
        |mut v| {
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm < 1e-8 {
                return None;
            }
            for val in &mut v {
                *val /= norm;
            }
            Some(v)
        },
    )
}

/// Generate a point owned by one of [`USERS`].
fn arb_point() -> impl Strategy<Value = VectorPoint> {
    (0..USERS.len(), "[a-d]", 0u32..8, "[a-z ]{5,30}", arb_normalized_embedding(DIM)).prop_map(
        |(user, doc, chunk_index, content, vector)| {
            let user_id = UserId::new(USERS[user]).unwrap();
            let document_id = format!("{}-{doc}", USERS[user]);
            VectorPoint {
                id: PointId::for_chunk(&user_id, &document_id, chunk_index),
                vector,
                payload: ChunkPayload {
                    document_id: document_id.clone(),
                    user_id,
                    chunk_index,
                    content,
                    filename: format!("{document_id}.txt"),
                    created_at: Utc::now(),
                },
            }
        },
    )
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap()
}

/// Search results are sorted by descending score, never fall below the
/// threshold, never exceed top_k and only ever belong to the searching user.
mod prop_search_invariants {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn results_are_sorted_thresholded_bounded_and_user_scoped(
            points in proptest::collection::vec(arb_point(), 1..40),
            query in arb_normalized_embedding(DIM),
            user in 0..USERS.len(),
            top_k in 1usize..25,
            threshold in -1.0f32..1.0f32,
        ) {
            let user_id = UserId::new(USERS[user]).unwrap();
            let results = runtime().block_on(async {
                let store = InMemoryVectorStore::new(DIM);
                let cancel = CancellationToken::new();
                store.upsert(&points, &cancel).await.unwrap();

                let options = SearchOptions::new(user_id.clone(), top_k, threshold).unwrap();
                store.search(&query, &options, &cancel).await.unwrap()
            });

            prop_assert!(results.len() <= top_k);
            for result in &results {
                prop_assert_eq!(&result.payload.user_id, &user_id);
                prop_assert!(result.score >= threshold);
            }
            for window in results.windows(2) {
                prop_assert!(
                    window[0].score >= window[1].score,
                    "results not in descending order: {} < {}",
                    window[0].score,
                    window[1].score,
                );
            }
        }
    }
}

/// Upserting the same points twice leaves the store in the same state, and a
/// later upsert of a point id replaces the earlier vector and payload.
mod prop_idempotent_upsert {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn repeated_upsert_does_not_duplicate(
            points in proptest::collection::vec(arb_point(), 1..30),
            query in arb_normalized_embedding(DIM),
        ) {
            let (first, second) = runtime().block_on(async {
                let store = InMemoryVectorStore::new(DIM);
                let cancel = CancellationToken::new();
                let alice = UserId::new("alice").unwrap();
                let options = SearchOptions::new(alice.clone(), 50, -1.0).unwrap();

                store.upsert(&points, &cancel).await.unwrap();
                let count = store.count(&SearchFilter::for_user(alice.clone()), &cancel).await.unwrap();
                let len = store.len().await;
                let results = store.search(&query, &options, &cancel).await.unwrap();

                store.upsert(&points, &cancel).await.unwrap();
                let count_again = store.count(&SearchFilter::for_user(alice), &cancel).await.unwrap();
                let len_again = store.len().await;
                let results_again = store.search(&query, &options, &cancel).await.unwrap();

                ((count, len, results), (count_again, len_again, results_again))
            });

            prop_assert_eq!(first.0, second.0);
            prop_assert_eq!(first.1, second.1);
            let ids: Vec<_> = first.2.iter().map(|r| r.id).collect();
            let ids_again: Vec<_> = second.2.iter().map(|r| r.id).collect();
            prop_assert_eq!(ids, ids_again);
        }

        #[test]
        fn latest_upsert_wins(
            point in arb_point(),
            vector in arb_normalized_embedding(DIM),
            content in "[a-z ]{5,30}",
        ) {
            let mut replacement = point.clone();
            replacement.vector = vector;
            replacement.payload.content = content;

            let stored = runtime().block_on(async {
                let store = InMemoryVectorStore::new(DIM);
                let cancel = CancellationToken::new();
                store.upsert(std::slice::from_ref(&point), &cancel).await.unwrap();
                store.upsert(std::slice::from_ref(&replacement), &cancel).await.unwrap();
                (store.len().await, store.get(&point.id).await)
            });

            prop_assert_eq!(stored.0, 1);
            prop_assert_eq!(stored.1, Some(replacement));
        }
    }
}

#[tokio::test]
async fn rejects_vectors_of_the_wrong_length() {
    let store = InMemoryVectorStore::new(DIM);
    let cancel = CancellationToken::new();
    let options = SearchOptions::new(UserId::new("alice").unwrap(), 5, 0.0).unwrap();

    let err = store.search(&[1.0, 0.0], &options, &cancel).await.unwrap_err();
    assert!(matches!(err, ragline::RagError::Validation(_)));
}
