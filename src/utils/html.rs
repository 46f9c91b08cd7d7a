/// Strips dangerous markup from admin-authored text (question bodies,
/// explanations, option labels) before it is stored.
///
/// Safe inline tags such as `<b>` survive; `<script>` elements and event
/// handler attributes are removed together with their content.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}

/// Sanitizes and trims in one step.
pub fn clean_text(input: &str) -> String {
    clean_html(input.trim())
}
