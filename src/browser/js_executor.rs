//! JS 执行器
//!
//! 持有一个 page，只暴露“执行 JS”的能力以及在它之上的几个页面脚本。
//! 不认识用户、小组，不处理流程。

use anyhow::Result;
use chromiumoxide::Page;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::models::{Credentials, RenderedItem};

pub struct JsExecutor {
    page: Page,
}

/// 把字符串安全地嵌入 JS 源码
fn js_literal(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

impl JsExecutor {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    /// 获取 page 的引用（用于导航、cookie 等操作）
    pub fn page(&self) -> &Page {
        &self.page
    }

    /// 执行 JS 代码并返回 JSON 结果
    pub async fn eval(&self, js_code: impl Into<String>) -> Result<JsonValue> {
        let result = self.page.evaluate(js_code.into()).await?;
        let json_value = result.into_value()?;
        Ok(json_value)
    }

    /// 执行 JS 代码并反序列化为指定类型
    pub async fn eval_as<T: DeserializeOwned>(&self, js_code: impl Into<String>) -> Result<T> {
        let json_value = self.eval(js_code).await?;
        let typed_value = serde_json::from_value(json_value)?;
        Ok(typed_value)
    }

    /// 页面上是否存在匹配选择器的元素
    pub async fn exists(&self, selector: &str) -> Result<bool> {
        let js = format!("!!document.querySelector({})", js_literal(selector));
        self.eval_as(js).await
    }

    /// 展开“查看更多”后读取所有帖子节点
    pub async fn capture_items(&self, item_selector: &str) -> Result<Vec<RenderedItem>> {
        let js = format!(
            r#"(() => {{
                const expand = ['See more', 'ראה עוד', 'עוד'];
                document.querySelectorAll("div[role='button']").forEach(btn => {{
                    const label = (btn.innerText || '').trim();
                    if (expand.includes(label)) {{
                        try {{ btn.click(); }} catch (e) {{}}
                    }}
                }});
                return Array.from(document.querySelectorAll({selector})).map(el => ({{
                    html: el.outerHTML,
                    text: el.innerText || ''
                }}));
            }})()"#,
            selector = js_literal(item_selector)
        );
        self.eval_as(js).await
    }

    pub async fn scroll_by(&self, pixels: u64) -> Result<()> {
        self.eval(format!("window.scrollBy(0, {pixels}); true")).await?;
        Ok(())
    }

    /// 填写登录表单并提交，找不到表单时返回 false
    pub async fn submit_login_form(&self, credentials: &Credentials) -> Result<bool> {
        let js = format!(
            r#"(() => {{
                const email = document.querySelector('input[name="email"]');
                const pass = document.querySelector('input[name="pass"]');
                if (!email || !pass) {{ return false; }}
                const setter = Object.getOwnPropertyDescriptor(HTMLInputElement.prototype, 'value').set;
                setter.call(email, {email});
                email.dispatchEvent(new Event('input', {{ bubbles: true }}));
                setter.call(pass, {password});
                pass.dispatchEvent(new Event('input', {{ bubbles: true }}));
                const button = document.querySelector('button[name="login"]')
                    || document.querySelector('button[type="submit"]');
                if (button) {{ button.click(); }} else {{ pass.form && pass.form.submit(); }}
                return true;
            }})()"#,
            email = js_literal(&credentials.email),
            password = js_literal(&credentials.password)
        );
        self.eval_as(js).await
    }
}

#[cfg(test)]
mod tests {
    use super::js_literal;

    #[test]
    fn literal_escapes_quotes() {
        assert_eq!(js_literal(r#"a"b"#), r#""a\"b""#);
        assert_eq!(js_literal("div[role='article']"), r#""div[role='article']""#);
    }
}
