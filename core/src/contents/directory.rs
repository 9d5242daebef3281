//! Synthetic directories under `cloud/`
//!
//! None of these directories exist in the backend. Each listing is computed
//! from catalog records on request: the root holds one node per category, a
//! category holds one node per namespace seen in its records, and a
//! namespace holds the records themselves.

use crate::contents::catalog::{ArrayRecord, Catalog};
use crate::contents::error::{ContentsError, ContentsResult};
use crate::contents::model::{ContentModel, ContentType};
use crate::contents::path::{Category, PathKind, CLOUD_ROOT, NOTEBOOK_EXT};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Organization name never offered as a namespace to create in
const PUBLIC_NAMESPACE: &str = "public";

pub struct DirectorySynthesizer {
    catalog: Arc<dyn Catalog>,
    tag: String,
}

impl DirectorySynthesizer {
    pub fn new(catalog: Arc<dyn Catalog>, tag: impl Into<String>) -> Self {
        Self {
            catalog,
            tag: tag.into(),
        }
    }

    /// Directory model for a remote directory path
    pub async fn list(&self, kind: &PathKind, include_content: bool) -> ContentsResult<ContentModel> {
        debug!(?kind, include_content, "listing synthetic directory");
        match kind {
            PathKind::CloudRoot => self.list_root(include_content).await,
            PathKind::Category(category) => self.list_category(*category, include_content).await,
            PathKind::Namespace { category, namespace } => {
                self.list_namespace(*category, namespace, include_content).await
            }
            PathKind::Local | PathKind::Leaf => Err(ContentsError::NotFound(format!("{:?} is not a directory", kind))),
        }
    }

    async fn list_root(&self, include_content: bool) -> ContentsResult<ContentModel> {
        let root = ContentModel::directory(CLOUD_ROOT);
        if !include_content {
            return Ok(root);
        }

        let (owned, shared, public) = futures::try_join!(
            self.fetch(Category::Owned, None),
            self.fetch(Category::Shared, None),
            self.fetch(Category::Public, None),
        )?;

        let mut children = Vec::with_capacity(Category::ALL.len());
        for (category, records) in [
            (Category::Owned, owned),
            (Category::Shared, shared),
            (Category::Public, public),
        ] {
            let namespaces = self.namespace_nodes(category, &records).await?;
            children.push(ContentModel::directory(&category_path(category)).with_children(namespaces));
        }
        Ok(root.with_children(children))
    }

    async fn list_category(&self, category: Category, include_content: bool) -> ContentsResult<ContentModel> {
        let model = ContentModel::directory(&category_path(category));
        if !include_content {
            return Ok(model);
        }

        let records = self.fetch(category, None).await?;
        let namespaces = self.namespace_nodes(category, &records).await?;
        Ok(model.with_children(namespaces))
    }

    async fn list_namespace(
        &self,
        category: Category,
        namespace: &str,
        include_content: bool,
    ) -> ContentsResult<ContentModel> {
        let namespace_path = format!("{}/{}", category_path(category), namespace);
        let model = ContentModel::directory(&namespace_path);
        if !include_content {
            return Ok(model);
        }

        let leaves = self
            .fetch(category, Some(namespace))
            .await?
            .into_iter()
            .map(|record| {
                let path = format!("{}/{}{}", namespace_path, record.name, NOTEBOOK_EXT);
                let mut leaf = ContentModel::base(&path, ContentType::Notebook);
                leaf.name = record.name.clone();
                leaf.last_modified = record.last_accessed;
                leaf.writable = record.is_writable();
                leaf
            })
            .collect();
        Ok(model.with_children(leaves))
    }

    /// One node per distinct namespace, in first-seen order. A user with no
    /// owned records still gets a node for themselves and each of their
    /// organizations, so there is somewhere to create the first notebook.
    /// The user's own node is listed too, so `orgA` and `orgB` come back as
    /// three nodes rather than two.
    async fn namespace_nodes(&self, category: Category, records: &[ArrayRecord]) -> ContentsResult<Vec<ContentModel>> {
        let base = category_path(category);

        if records.is_empty() && category == Category::Owned {
            let profile = self
                .catalog
                .current_user_profile()
                .await
                .map_err(|e| ContentsError::catalog("Error fetching user profile", e))?;

            let nodes = std::iter::once(profile.username)
                .chain(profile.organizations)
                .filter(|namespace| namespace != PUBLIC_NAMESPACE)
                .map(|namespace| ContentModel::directory(&format!("{}/{}", base, namespace)))
                .collect();
            return Ok(nodes);
        }

        let mut seen = HashSet::new();
        let nodes = records
            .iter()
            .filter(|record| seen.insert(record.namespace.as_str()))
            .map(|record| {
                let mut node = ContentModel::directory(&format!("{}/{}", base, record.namespace));
                node.writable = category == Category::Owned;
                node
            })
            .collect();
        Ok(nodes)
    }

    async fn fetch(&self, category: Category, namespace: Option<&str>) -> ContentsResult<Vec<ArrayRecord>> {
        let listed = match category {
            Category::Owned => self.catalog.list_owned(&self.tag, namespace).await,
            Category::Shared => self.catalog.list_shared(&self.tag, namespace).await,
            Category::Public => self.catalog.list_public(&self.tag, namespace).await,
        };
        listed.map_err(|e| {
            let scope = namespace.unwrap_or(category.as_str());
            ContentsError::catalog(format!("Error listing notebooks in {}", scope), e)
        })
    }
}

fn category_path(category: Category) -> String {
    format!("{}/{}", CLOUD_ROOT, category)
}
