use crate::domain::order::{FullOrder, OrderDetail, OrderHeader, OrderHeaderId};
use crate::domain::ports::{HeaderFilter, RecordStoreRef, UserDirectory};
use crate::domain::user::UserProfile;
use crate::error::{OrderError, Result};
use futures::{StreamExt, TryStreamExt, stream};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Builds full order views (header, baskets and owner profile).
///
/// Bulk reads fetch headers and baskets concurrently, then look up owner
/// profiles with at most `max_in_flight` requests outstanding. The first
/// failing fetch aborts the whole read and drops the fetches still running.
pub struct OrderAggregator {
    store: RecordStoreRef,
    users: Arc<dyn UserDirectory>,
    max_in_flight: usize,
}

impl OrderAggregator {
    pub fn new(store: RecordStoreRef, users: Arc<dyn UserDirectory>, max_in_flight: usize) -> Self {
        Self {
            store,
            users,
            max_in_flight: max_in_flight.max(1),
        }
    }

    pub async fn header(&self, id: OrderHeaderId) -> Result<OrderHeader> {
        self.store
            .find_header(id)
            .await?
            .ok_or_else(|| OrderError::not_found("order", id))
    }

    pub async fn full_order(&self, id: OrderHeaderId) -> Result<FullOrder> {
        let header = self.header(id).await?;
        self.assemble(header).await
    }

    /// Sequential join for a single header.
    pub async fn assemble(&self, header: OrderHeader) -> Result<FullOrder> {
        let baskets = self.store.list_details(Some(header.id)).await?;
        let user = self.profile(&header.user_id).await?;
        Ok(FullOrder {
            header,
            user,
            baskets,
        })
    }

    pub async fn assemble_many(&self, filter: &HeaderFilter) -> Result<Vec<FullOrder>> {
        let (headers, details) = tokio::try_join!(
            self.store.list_headers(filter),
            self.store.list_details(None)
        )?;
        if headers.is_empty() {
            return Ok(Vec::new());
        }

        let mut by_header: HashMap<OrderHeaderId, Vec<OrderDetail>> = HashMap::new();
        for detail in details {
            by_header.entry(detail.header_id).or_default().push(detail);
        }

        let user_ids: HashSet<&str> = headers.iter().map(|h| h.user_id.as_str()).collect();
        let limit = self.max_in_flight.min(user_ids.len());
        let profiles: HashMap<String, UserProfile> = stream::iter(user_ids)
            .map(|user_id| async move {
                self.profile(user_id)
                    .await
                    .map(|p| (user_id.to_string(), p))
            })
            .buffer_unordered(limit)
            .try_collect()
            .await?;

        headers
            .into_iter()
            .map(|header| {
                let user = profiles
                    .get(&header.user_id)
                    .cloned()
                    .ok_or_else(|| OrderError::not_found("user", &header.user_id))?;
                let baskets = by_header.remove(&header.id).unwrap_or_default();
                Ok(FullOrder {
                    header,
                    user,
                    baskets,
                })
            })
            .collect()
    }

    async fn profile(&self, user_id: &str) -> Result<UserProfile> {
        self.users
            .get_by_id(user_id)
            .await
            .map_err(|e| OrderError::dependency("user directory", e))
    }
}
