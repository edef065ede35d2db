//! 小组抓取流程 - 流程层
//!
//! 核心职责：定义"一个小组一个周期"的完整处理流程
//!
//! 流程顺序：
//! 1. 打开小组页面 / 向下滚动 → 读取渲染内容
//! 2. 解析帖子 → 周期内去重 → 已处理去重 → 关键词过滤
//! 3. 按 batch_size 分批分类
//! 4. 保存房源 → mark_processed（失败的留到下个周期）

use std::collections::HashSet;
use std::sync::Arc;

use rand::Rng;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::browser::{FetchRequest, SubContext};
use crate::config::{EffectiveConfig, ScrapeSettings};
use crate::error::{ClassifyError, FetchError};
use crate::models::{
    CycleReport, ExtractedListing, FailureKind, GroupOutcome, ListingFields, RawPost,
    RenderedContent,
};
use crate::services::{post_parser, Classifier, RelevanceFilter};
use crate::store::Store;
use crate::tracker::{PostTracker, TrackerView};
use crate::utils::logging::truncate_text;
use crate::utils::{retry_async, retry_async_if};
use crate::workflow::group_ctx::GroupCtx;

/// 小组抓取流程
///
/// - 编排一个小组的抓取、去重、分类、落库
/// - 不持有浏览器资源，只借用子上下文
/// - 单个帖子的失败不会中断整个小组
pub struct GroupScraper {
    store: Arc<dyn Store>,
    classifier: Arc<dyn Classifier>,
}

/// 单次 run 内的可变状态
struct Cycle<'a> {
    ctx: &'a GroupCtx,
    settings: ScrapeSettings,
    tracker: PostTracker,
    view: TrackerView,
    report: CycleReport,
}

fn scroll_distance(min_px: u64, max_px: u64) -> u64 {
    if max_px > min_px {
        rand::thread_rng().gen_range(min_px..=max_px)
    } else {
        min_px
    }
}

impl GroupScraper {
    pub fn new(store: Arc<dyn Store>, classifier: Arc<dyn Classifier>) -> Self {
        Self { store, classifier }
    }

    /// 跑一个周期，任何情况下都返回报告
    pub async fn run(
        &self,
        ctx: &GroupCtx,
        sub: &SubContext<'_>,
        config: &EffectiveConfig,
        view: TrackerView,
    ) -> CycleReport {
        let settings = config.scrape_settings();
        let filter = RelevanceFilter::new(settings.relevance_filter, &settings.extra_keywords);
        let mut cycle = Cycle {
            ctx,
            tracker: PostTracker::new(self.store.clone()).with_retry(settings.store_retry),
            settings,
            view,
            report: CycleReport::new(&ctx.group_id),
        };

        info!(
            "{} 🔍 开始抓取 (已处理 {} 条，目标 {} 条)",
            ctx,
            cycle.view.len(),
            cycle.settings.num_posts_to_fetch
        );

        let mut seen: HashSet<String> = HashSet::new();
        let mut pending: Vec<RawPost> = Vec::new();

        'rounds: for round in 0..=cycle.settings.scroll_times {
            if self.abort_if_rejected(sub, &mut cycle) {
                break;
            }
            if cycle.report.fetched >= cycle.settings.num_posts_to_fetch {
                break;
            }

            let request = if round == 0 {
                FetchRequest::Load {
                    url: ctx.url.clone(),
                }
            } else {
                FetchRequest::Scroll {
                    pixels: scroll_distance(cycle.settings.scroll_min_px, cycle.settings.scroll_max_px),
                    settle: cycle.settings.scroll_delay,
                }
            };

            let content = match self.fetch(sub, &request, &cycle.settings, ctx).await {
                Ok(content) => content,
                Err(FetchError::Rejected(url)) => {
                    sub.mark_session_rejected();
                    self.abort_if_rejected(sub, &mut cycle);
                    debug!("{} 被重定向到 {}", ctx, url);
                    break;
                }
                Err(e) => {
                    error!("{} ❌ 抓取失败，放弃本周期: {}", ctx, e);
                    cycle.report.outcome = GroupOutcome::Abandoned;
                    cycle.report.record(FailureKind::TransientFetch, None, e.to_string());
                    break;
                }
            };

            for post in post_parser::parse_rendered(&content) {
                if cycle.report.fetched >= cycle.settings.num_posts_to_fetch {
                    break;
                }
                if !seen.insert(post.post_id.clone()) {
                    continue;
                }
                cycle.report.fetched += 1;
                if cycle.view.contains(&post.post_id) {
                    cycle.report.deduped += 1;
                    continue;
                }
                if !filter.is_relevant(&post.text) {
                    debug!("{} 跳过无关帖子 {}", ctx, post.post_id);
                    cycle.report.filtered += 1;
                    continue;
                }
                pending.push(post);
            }

            while pending.len() >= cycle.settings.batch_size {
                if self.abort_if_rejected(sub, &mut cycle) {
                    break 'rounds;
                }
                let batch: Vec<RawPost> = pending.drain(..cycle.settings.batch_size).collect();
                self.process_batch(&mut cycle, batch).await;
            }
        }

        // 抓取被放弃时，已收集的帖子照样处理
        if cycle.report.outcome != GroupOutcome::SessionRejected {
            while !pending.is_empty() {
                if self.abort_if_rejected(sub, &mut cycle) {
                    break;
                }
                let take = pending.len().min(cycle.settings.batch_size);
                let batch: Vec<RawPost> = pending.drain(..take).collect();
                self.process_batch(&mut cycle, batch).await;
            }
        }

        let report = cycle.report;
        info!(
            "{} ✓ 周期结束: 抓取 {} / 去重 {} / 过滤 {} / 分类 {} / 保存 {} / 失败 {}",
            ctx,
            report.fetched,
            report.deduped,
            report.filtered,
            report.classified,
            report.saved,
            report.failed
        );
        report
    }

    /// 会话已被拒绝则把报告标记为中止，返回是否中止
    fn abort_if_rejected(&self, sub: &SubContext<'_>, cycle: &mut Cycle<'_>) -> bool {
        if !sub.is_session_rejected() {
            return false;
        }
        if cycle.report.outcome != GroupOutcome::SessionRejected {
            warn!("{} 🚫 会话已被拒绝，中止本小组", cycle.ctx);
            cycle.report.outcome = GroupOutcome::SessionRejected;
            cycle
                .report
                .record(FailureKind::SessionRejected, None, "会话被来源拒绝");
        }
        true
    }

    async fn fetch(
        &self,
        sub: &SubContext<'_>,
        request: &FetchRequest,
        settings: &ScrapeSettings,
        ctx: &GroupCtx,
    ) -> Result<RenderedContent, FetchError> {
        let limit = settings.fetch_timeout;
        let label = format!("{} 抓取", ctx);
        retry_async_if(settings.fetch_retry, &label, FetchError::is_retryable, move || async move {
            match timeout(limit, sub.fetch(request)).await {
                Ok(result) => result,
                Err(_) => Err(FetchError::Timeout {
                    secs: limit.as_secs(),
                }),
            }
        })
        .await
    }

    async fn process_batch(&self, cycle: &mut Cycle<'_>, batch: Vec<RawPost>) {
        let texts: Vec<String> = batch.iter().map(|post| post.text.clone()).collect();
        let limit = cycle.settings.classify_timeout;
        cycle.report.classify_calls += 1;
        debug!("{} 🧠 分类 {} 条帖子", cycle.ctx, texts.len());

        let result = match timeout(limit, self.classifier.classify(&texts)).await {
            Ok(result) => result,
            Err(_) => Err(ClassifyError::Timeout {
                secs: limit.as_secs(),
            }),
        };

        match result {
            Ok(items) => {
                let mut by_index: Vec<Option<Result<ListingFields, String>>> =
                    (0..batch.len()).map(|_| None).collect();
                for (index, item) in items {
                    if let Some(slot) = by_index.get_mut(index) {
                        *slot = Some(item);
                    }
                }
                for (post, item) in batch.iter().zip(by_index) {
                    match item.unwrap_or_else(|| Err("分类结果缺失".to_string())) {
                        Ok(fields) => self.commit(cycle, post, fields).await,
                        Err(reason) => self.fail_item(cycle, post, &reason).await,
                    }
                }
            }
            Err(e) => {
                warn!("{} ⚠️ 整批分类失败: {}", cycle.ctx, e);
                let reason = e.to_string();
                for post in &batch {
                    self.fail_item(cycle, post, &reason).await;
                }
            }
        }
    }

    /// 保存房源后再标记已处理；任一步失败都不标记
    async fn commit(&self, cycle: &mut Cycle<'_>, post: &RawPost, fields: ListingFields) {
        let is_listing = fields.is_listing();
        if is_listing {
            let listing = ExtractedListing::new(&cycle.ctx.platform, &cycle.ctx.group_id, post, fields);
            let saved = retry_async(cycle.settings.store_retry, "保存房源", || {
                self.store.save_listing(&listing)
            })
            .await;
            if let Err(e) = saved {
                error!("{} ❌ 保存房源 {} 失败: {}", cycle.ctx, post.post_id, e);
                cycle.report.record(
                    FailureKind::StoreWriteFailure,
                    Some(post.post_id.as_str()),
                    e.to_string(),
                );
                return;
            }
        }

        if let Err(e) = cycle
            .tracker
            .mark_processed(&cycle.ctx.group_id, &post.post_id)
            .await
        {
            error!("{} ❌ 标记 {} 失败: {}", cycle.ctx, post.post_id, e);
            cycle.report.record(
                FailureKind::StoreWriteFailure,
                Some(post.post_id.as_str()),
                e.to_string(),
            );
            return;
        }

        cycle.view.insert(&post.post_id);
        cycle.report.classified += 1;
        if is_listing {
            cycle.report.saved += 1;
            info!(
                "{} 🏠 保存房源 {}: {}",
                cycle.ctx,
                post.post_id,
                truncate_text(&post.text, 40)
            );
        } else {
            cycle.report.not_listing += 1;
        }
    }

    /// 记录单条失败；累计失败次数超过上限后按已处理放弃
    async fn fail_item(&self, cycle: &mut Cycle<'_>, post: &RawPost, reason: &str) {
        cycle.report.failed += 1;
        cycle.report.record(
            FailureKind::ClassificationFailure,
            Some(post.post_id.as_str()),
            reason,
        );

        let attempts = match cycle
            .tracker
            .record_failure(&cycle.ctx.group_id, &post.post_id)
            .await
        {
            Ok(attempts) => attempts,
            Err(e) => {
                cycle.report.record(
                    FailureKind::StoreWriteFailure,
                    Some(post.post_id.as_str()),
                    e.to_string(),
                );
                return;
            }
        };

        if attempts <= cycle.settings.max_classify_attempts {
            debug!(
                "{} 帖子 {} 分类失败 {}/{} 次",
                cycle.ctx, post.post_id, attempts, cycle.settings.max_classify_attempts
            );
            return;
        }

        warn!(
            "{} ☠️ 帖子 {} 已失败 {} 次，不再重试",
            cycle.ctx, post.post_id, attempts
        );
        match cycle
            .tracker
            .mark_processed(&cycle.ctx.group_id, &post.post_id)
            .await
        {
            Ok(()) => {
                cycle.view.insert(&post.post_id);
                cycle.report.poisoned += 1;
            }
            Err(e) => cycle.report.record(
                FailureKind::StoreWriteFailure,
                Some(post.post_id.as_str()),
                e.to_string(),
            ),
        }
    }
}
