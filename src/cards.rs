//! Self-contained, style-inlined embed cards for platforms whose official
//! embed is unreliable or auth-gated. All interpolated text is escaped.

use crate::metadata::PageMetadata;

pub(crate) fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

const CARD_FONT: &str =
    "-apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif";

fn image_section(image_url: Option<&str>, with_play_button: bool) -> String {
    let Some(image_url) = image_url else {
        return String::new();
    };
    let play_button = if with_play_button {
        r#"<div style="position: absolute; top: 50%; left: 50%; transform: translate(-50%, -50%); width: 60px; height: 60px; background: rgba(0,0,0,0.7); border-radius: 50%;"></div>"#
    } else {
        ""
    };
    format!(
        r#"<div style="position: relative; margin-bottom: 12px;"><img src="{}" style="width: 100%; border-radius: 8px;" alt="Preview" />{}</div>"#,
        escape_html(image_url),
        play_button
    )
}

fn title_section(title: Option<&str>) -> String {
    match title {
        Some(title) if !title.is_empty() => format!(
            r#"<div style="font-weight: 600; margin-bottom: 8px; color: #333; font-size: 16px;">{}</div>"#,
            escape_html(title)
        ),
        _ => String::new(),
    }
}

fn description_section(description: Option<&str>) -> String {
    match description {
        Some(description) if !description.is_empty() => format!(
            r#"<div style="color: #666; font-size: 14px; line-height: 1.4; margin-bottom: 12px;">{}</div>"#,
            escape_html(description)
        ),
        _ => String::new(),
    }
}

pub(crate) fn instagram_card(url: &str, meta: &PageMetadata) -> String {
    format!(
        r#"<div class="instagram-embed-custom" style="border: 1px solid #dbdbdb; border-radius: 12px; width: 100%; max-width: 600px; margin: 0 auto; background: white; font-family: {font}; box-sizing: border-box;">
  <div style="padding: 16px;">
    <div style="display: flex; align-items: center; margin-bottom: 12px;">
      <div style="width: 32px; height: 32px; border-radius: 50%; background: linear-gradient(45deg, #f09433 0%,#e6683c 25%,#dc2743 50%,#cc2366 75%,#bc1888 100%); margin-right: 12px;"></div>
      <div>
        <div style="font-weight: 600; font-size: 14px;">Instagram Post</div>
        <div style="font-size: 12px; color: #8e8e8e;">View on Instagram</div>
      </div>
    </div>
    {image}{title}
    <div style="font-size: 12px; color: #8e8e8e;">
      <a href="{url}" target="_blank" style="color: #0095f6; text-decoration: none;">View on Instagram</a>
    </div>
  </div>
</div>"#,
        font = CARD_FONT,
        image = image_section(meta.image.as_deref(), false),
        title = title_section(meta.title.as_deref()),
        url = escape_html(url),
    )
}

/// TikTok's official blockquote embed, hydrated by their embed.js.
pub(crate) fn tiktok_blockquote(
    url: &str,
    video_id: Option<&str>,
    title: Option<&str>,
    description: Option<&str>,
    thumbnail_url: Option<&str>,
) -> String {
    format!(
        r#"<div class="tiktok-embed-wrapper" style="width: 100%; max-width: 325px; margin: 0 auto;">
  <blockquote class="tiktok-embed" cite="{url}" data-video-id="{video_id}" style="max-width: 325px; min-width: 325px; border: 1px solid #d9d9d9; border-radius: 8px; margin: 0 auto; padding: 0; background: white;">
    <section style="padding: 16px;">
      <a target="_blank" title="{title_attr}" href="{url}" style="text-decoration: none; color: #000;">
        {image}{title}{description}
        <div style="font-size: 14px; color: #000;">View on TikTok</div>
      </a>
    </section>
  </blockquote>
  <script async src="https://www.tiktok.com/embed.js"></script>
</div>"#,
        url = escape_html(url),
        video_id = escape_html(video_id.unwrap_or("")),
        title_attr = escape_html(title.unwrap_or("TikTok Video")),
        image = image_section(thumbnail_url, false),
        title = title_section(title),
        description = description_section(description),
    )
}

/// Hand-built TikTok card, used when the official oEmbed answers without
/// usable markup.
pub(crate) fn tiktok_card(
    url: &str,
    title: Option<&str>,
    description: Option<&str>,
    thumbnail_url: Option<&str>,
    author_name: Option<&str>,
) -> String {
    let author = match author_name {
        Some(author) if !author.is_empty() => format!(
            r#"<div style="color: #888; font-size: 13px; margin-bottom: 8px;">By {}</div>"#,
            escape_html(author)
        ),
        _ => String::new(),
    };
    format!(
        r#"<div class="tiktok-embed-custom" style="border: 1px solid #e5e5e5; border-radius: 12px; width: 100%; max-width: 600px; margin: 0 auto; background: white; font-family: {font}; box-sizing: border-box; box-shadow: 0 2px 8px rgba(0, 0, 0, 0.1);">
  <div style="background: #000; color: white; padding: 12px; border-radius: 12px 12px 0 0;">
    <div style="font-weight: bold; font-size: 16px;">TikTok</div>
  </div>
  <div style="padding: 16px;">
    {image}{title}{description}{author}
    <div style="display: flex; align-items: center; justify-content: space-between; font-size: 12px; color: #666;">
      <span>Video content &middot; TikTok</span>
      <a href="{url}" target="_blank" style="color: #000; text-decoration: none; font-weight: 600;">Watch on TikTok</a>
    </div>
  </div>
</div>"#,
        font = CARD_FONT,
        image = image_section(thumbnail_url, true),
        title = title_section(title),
        description = description_section(description),
        author = author,
        url = escape_html(url),
    )
}

pub(crate) fn facebook_card(
    url: &str,
    title: Option<&str>,
    description: Option<&str>,
    image_url: Option<&str>,
    is_video: bool,
) -> String {
    let content_type = if is_video {
        "Video content"
    } else {
        "Post content"
    };
    format!(
        r#"<div class="facebook-embed" style="border: 1px solid #e5e5e5; border-radius: 12px; width: 100%; max-width: 600px; margin: 0 auto; background: white; font-family: {font}; box-sizing: border-box; box-shadow: 0 2px 8px rgba(0, 0, 0, 0.1);">
  <div style="background: #1877f2; color: white; padding: 12px; border-radius: 12px 12px 0 0;">
    <div style="font-weight: bold; font-size: 16px;">Facebook</div>
  </div>
  <div style="padding: 16px;">
    {image}{title}{description}
    <div style="background: #f7f8fa; border-radius: 8px; padding: 12px; margin-bottom: 8px;">
      <div style="font-size: 13px; color: #8a8d91; line-height: 1.4;">
        {content_type} &middot; Due to Facebook's privacy settings, full content embedding is limited
      </div>
    </div>
    <div style="font-size: 12px; color: #999;">
      <a href="{url}" target="_blank" style="color: #1877f2; text-decoration: none;">View on Facebook</a>
    </div>
  </div>
</div>"#,
        font = CARD_FONT,
        image = image_section(image_url, is_video),
        title = title_section(title),
        description = description_section(description),
        content_type = content_type,
        url = escape_html(url),
    )
}

/// Pinterest's official embed iframe.
pub(crate) fn pinterest_iframe(pin_id: &str, title: Option<&str>) -> String {
    format!(
        r#"<div class="pinterest-embed" style="width: 100%; max-width: 600px; margin: 0 auto; border-radius: 12px; overflow: hidden; box-shadow: 0 2px 8px rgba(0, 0, 0, 0.1);">
  <iframe src="https://assets.pinterest.com/ext/embed.html?id={pin_id}" height="345" width="100%" frameborder="0" scrolling="no" style="border-radius: 12px; display: block;" title="{title}"></iframe>
</div>"#,
        pin_id = escape_html(pin_id),
        title = escape_html(title.unwrap_or("Pinterest Pin")),
    )
}

pub(crate) fn generic_card(
    url: &str,
    domain: &str,
    title: Option<&str>,
    description: Option<&str>,
    image_url: Option<&str>,
) -> String {
    format!(
        r#"<div class="generic-embed" style="border: 1px solid #e5e5e5; border-radius: 8px; width: 100%; max-width: 600px; margin: 0 auto; background: white; font-family: {font}; box-sizing: border-box;">
  <div style="padding: 16px;">
    {title}{description}{image}
    <div style="font-size: 12px; color: #999; display: flex; align-items: center; justify-content: space-between;">
      <span>{domain}</span>
      <a href="{url}" target="_blank" style="color: #0066cc; text-decoration: none;">Visit link</a>
    </div>
  </div>
</div>"#,
        font = CARD_FONT,
        title = title_section(title),
        description = description_section(description),
        image = image_section(image_url, false),
        domain = escape_html(domain),
        url = escape_html(url),
    )
}
