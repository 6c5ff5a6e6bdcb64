use maud::{DOCTYPE, Markup, html};

use crate::{
    double_feature::{DoubleFeatureItem, DoubleFeaturePair, PairMode, PairSource},
    routes::{Analysis, DoubleFeatureResponse},
    stats::{AffinityRow, Breakdown, FlagCount, NamedCount},
};

const TAILWIND_CDN: &str = "https://cdn.tailwindcss.com";
const TMDB_POSTER_BASE: &str = "https://image.tmdb.org/t/p/w154";

pub fn index_page() -> String {
    page(
        "Letterbddy",
        html! {
            div class="min-h-screen bg-gray-50" {
                div class="max-w-2xl mx-auto px-6 py-12" {
                    div class="bg-white shadow rounded-lg p-8" {
                        h1 class="text-3xl font-bold text-gray-900" { "Letterbddy" }
                        p class="mt-2 text-gray-600" { "Stats and double features from your Letterboxd exports." }

                        form class="mt-8 space-y-6" method="post" action="/dashboard" enctype="multipart/form-data" {
                            (file_input("diary", "Diary (diary.csv)"))
                            (file_input("reviews", "Reviews (reviews.csv)"))
                            (file_input("watchlist", "Watchlist (watchlist.csv)"))

                            div {
                                label class="block text-sm font-medium text-gray-700" for="username" { "Or a Letterboxd username" }
                                input class="mt-2 w-full rounded-md border border-gray-300 px-3 py-2 focus:border-blue-500 focus:outline-none focus:ring-1 focus:ring-blue-500" name="username" id="username" pattern="[A-Za-z0-9_\\-]+";
                                p class="mt-2 text-xs text-gray-500" { "Uses the public RSS feed, which only carries the last 50 diary entries." }
                            }

                            div class="grid gap-4 md:grid-cols-2" {
                                div {
                                    label class="block text-sm font-medium text-gray-700" for="mode" { "Double feature mode" }
                                    select class="mt-2 w-full rounded-md border border-gray-300 px-3 py-2" name="mode" id="mode" {
                                        @for mode in PairMode::ALL {
                                            option value=(mode.slug()) selected[mode == PairMode::default()] { (mode.label()) }
                                        }
                                    }
                                }
                                div {
                                    label class="block text-sm font-medium text-gray-700" for="source" { "Pair from" }
                                    select class="mt-2 w-full rounded-md border border-gray-300 px-3 py-2" name="source" id="source" {
                                        option value="curated" selected { "Curated lists" }
                                        option value="watchlist" { "My watchlist" }
                                    }
                                }
                            }

                            button class="w-full rounded-md bg-blue-600 px-4 py-2 font-semibold text-white hover:bg-blue-700" type="submit" { "Build dashboard" }
                        }
                    }
                }
            }
        },
    )
}

fn file_input(name: &str, label: &str) -> Markup {
    html! {
        div {
            label class="block text-sm font-medium text-gray-700" for=(name) { (label) }
            input class="mt-2 block w-full text-sm text-gray-700" type="file" accept=".csv,text/csv" name=(name) id=(name);
        }
    }
}

pub struct Dashboard<'a> {
    pub username: Option<&'a str>,
    pub analysis: &'a Analysis,
    pub features: &'a DoubleFeatureResponse,
    pub mode: PairMode,
    pub source: PairSource,
}

pub fn dashboard_page(view: &Dashboard<'_>) -> String {
    let diary = &view.analysis.diary;
    let summary = &view.analysis.summary;

    page(
        "Your dashboard",
        html! {
            div class="min-h-screen bg-gray-50" {
                div class="max-w-5xl mx-auto px-6 py-10 space-y-8" {
                    div class="flex items-start justify-between gap-6" {
                        div {
                            h1 class="text-3xl font-bold text-gray-900" { "Your dashboard" }
                            @if let Some(username) = view.username {
                                p class="mt-2 text-gray-600" { "@" (username) " · recent diary via RSS" }
                            }
                            p class="mt-1 text-sm text-gray-500" {
                                (summary.urls) " films · " (summary.cached) " cached · "
                                (summary.enriched) " enriched"
                                @if summary.tmdb_errors > 0 { " · " (summary.tmdb_errors) " without TMDb data" }
                            }
                        }
                        a class="text-sm text-blue-600 hover:text-blue-800" href="/" { "Start over" }
                    }

                    @if diary.total_entries > 0 {
                        section class="bg-white shadow rounded-lg p-6" {
                            h2 class="text-xl font-semibold text-gray-900" { "Diary" }
                            dl class="mt-4 grid grid-cols-2 gap-4 md:grid-cols-4" {
                                (stat("Entries", diary.total_entries.to_string()))
                                (stat("Films", diary.unique_films.to_string()))
                                (stat("Rewatches", diary.rewatches.to_string()))
                                (stat("Average rating", diary.average_rating.map(|r| format!("{r:.2}")).unwrap_or_else(|| "–".to_string())))
                            }

                            @if diary.rated > 0 {
                                h3 class="mt-6 text-sm font-semibold text-gray-700" { "Ratings" }
                                div class="mt-2 flex items-end gap-1 h-24" {
                                    @let max = diary.rating_histogram.iter().map(|b| b.count).max().unwrap_or(1).max(1);
                                    @for bucket in &diary.rating_histogram {
                                        div class="flex-1 bg-green-500" title=(format!("{} ★: {}", bucket.rating, bucket.count))
                                            style=(format!("height: {}%", bucket.count * 100 / max)) {}
                                    }
                                }
                            }

                            (breakdown_table(&diary.breakdown))

                            div class="mt-6 grid gap-6 md:grid-cols-2" {
                                (named_counts("Countries", &diary.countries))
                                (named_counts("Languages", &diary.languages))
                                (affinity("Directors", &diary.top_directors))
                                (affinity("Genres", &diary.top_genres))
                            }

                            @if diary.missing.count > 0 {
                                p class="mt-6 text-xs text-gray-500" {
                                    (diary.missing.count) " entries had no enrichment data."
                                }
                            }
                        }
                    }

                    @if view.analysis.reviews.count > 0 {
                        @let reviews = &view.analysis.reviews;
                        section class="bg-white shadow rounded-lg p-6" {
                            h2 class="text-xl font-semibold text-gray-900" { "Reviews" }
                            dl class="mt-4 grid grid-cols-3 gap-4" {
                                (stat("Reviews", reviews.count.to_string()))
                                (stat("Words", reviews.total_words.to_string()))
                                (stat("Words per review", format!("{:.0}", reviews.average_words)))
                            }
                        }
                    }

                    @if view.analysis.watchlist.total > 0 {
                        @let watchlist = &view.analysis.watchlist;
                        section class="bg-white shadow rounded-lg p-6" {
                            h2 class="text-xl font-semibold text-gray-900" { "Watchlist" }
                            dl class="mt-4 grid grid-cols-3 gap-4" {
                                (stat("Films", watchlist.total.to_string()))
                                (stat("Runtime", format!("{}h", watchlist.total_runtime_minutes / 60)))
                                (stat("Countries", watchlist.countries.len().to_string()))
                            }
                            (breakdown_table(&watchlist.breakdown))
                        }
                    }

                    section class="bg-white shadow rounded-lg p-6" {
                        h2 class="text-xl font-semibold text-gray-900" { "Double features" }
                        p class="mt-1 text-sm text-gray-500" {
                            (view.mode.label()) " · "
                            @match view.source {
                                PairSource::Curated => { "from curated lists" }
                                PairSource::Watchlist => { "from your watchlist" }
                            }
                            " · seed " (view.features.seed)
                        }
                        @if let Some(message) = view.features.message {
                            p class="mt-4 text-gray-600" { (message) }
                        }
                        div class="mt-4 space-y-4" {
                            @for pair in &view.features.pairs {
                                (pair_card(pair))
                            }
                        }
                    }
                }
            }
        },
    )
}

pub fn error_page(message: &str) -> String {
    page(
        "Error",
        html! {
            div class="min-h-screen bg-gray-50 flex items-center justify-center" {
                div class="max-w-xl w-full px-6" {
                    div class="bg-white shadow rounded-lg p-8" {
                        h1 class="text-2xl font-bold text-gray-900" { "Error" }
                        p class="mt-4 text-gray-700" { (message) }
                        a class="mt-6 inline-block text-blue-600 hover:text-blue-800" href="/" { "Back" }
                    }
                }
            }
        },
    )
}

fn page(title: &str, body: Markup) -> String {
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1";
                title { (title) }
                script src=(TAILWIND_CDN) {}
            }
            body { (body) }
        }
    }
    .into_string()
}

fn stat(label: &str, value: String) -> Markup {
    html! {
        div {
            dt class="text-xs uppercase tracking-wide text-gray-500" { (label) }
            dd class="mt-1 text-2xl font-semibold text-gray-900" { (value) }
        }
    }
}

fn breakdown_table(b: &Breakdown) -> Markup {
    let rows: [(&str, &FlagCount); 6] = [
        ("Directed by women", &b.directed_by_woman),
        ("Written by women", &b.written_by_woman),
        ("American", &b.american),
        ("English language", &b.english),
        ("Criterion Collection", &b.criterion),
        ("Black directors", &b.black_director),
    ];

    html! {
        table class="mt-6 w-full text-sm" {
            thead {
                tr class="text-left text-gray-500" {
                    th class="py-1 font-medium" { "" }
                    th class="py-1 font-medium" { "Yes" }
                    th class="py-1 font-medium" { "No" }
                    th class="py-1 font-medium" { "Unknown" }
                }
            }
            tbody {
                @for (label, count) in rows {
                    tr class="border-t border-gray-100" {
                        td class="py-1 text-gray-700" { (label) }
                        td class="py-1" { (count.yes) }
                        td class="py-1" { (count.no) }
                        td class="py-1 text-gray-400" { (count.unknown) }
                    }
                }
            }
        }
    }
}

fn named_counts(title: &str, rows: &[NamedCount]) -> Markup {
    html! {
        div {
            h3 class="text-sm font-semibold text-gray-700" { (title) }
            ol class="mt-2 space-y-1" {
                @for row in rows.iter().take(10) {
                    li class="flex justify-between text-sm text-gray-700" {
                        span { (row.name) }
                        span class="text-gray-500" { (row.count) }
                    }
                }
            }
        }
    }
}

fn affinity(title: &str, rows: &[AffinityRow]) -> Markup {
    html! {
        div {
            h3 class="text-sm font-semibold text-gray-700" { (title) }
            @if rows.is_empty() {
                p class="mt-2 text-sm text-gray-500" { "–" }
            }
            ol class="mt-2 space-y-1" {
                @for row in rows {
                    li class="flex justify-between text-sm text-gray-700" {
                        span { (row.name) }
                        span class="text-gray-500" { (row.films) " films · " (format!("{:.1}", row.average_rating)) " ★" }
                    }
                }
            }
        }
    }
}

fn pair_card(pair: &DoubleFeaturePair) -> Markup {
    html! {
        div class="rounded-lg border border-gray-200 p-4" {
            div class="grid gap-4 md:grid-cols-2" {
                (item_card(&pair.a))
                (item_card(&pair.b))
            }
            ul class="mt-3 flex flex-wrap gap-2" {
                @for reason in &pair.reasons {
                    li class="rounded-full bg-blue-50 px-3 py-1 text-xs text-blue-700" { (reason) }
                }
            }
        }
    }
}

fn item_card(item: &DoubleFeatureItem) -> Markup {
    html! {
        div class="flex gap-3" {
            @if let Some(poster) = &item.poster_path {
                img class="w-16 rounded" src=(format!("{TMDB_POSTER_BASE}{poster}")) alt=(item.name);
            }
            div {
                a class="font-semibold text-gray-900 hover:text-blue-700" href=(item.key) target="_blank" rel="noopener noreferrer" {
                    (item.name)
                }
                @if let Some(year) = item.year {
                    span class="ml-2 text-gray-500" { "(" (year) ")" }
                }
                p class="text-sm text-gray-500" {
                    @if !item.director_names.is_empty() { (item.director_names.join(", ")) }
                    @if let Some(runtime) = item.runtime { " · " (runtime) "m" }
                }
                @if item.on_watchlist {
                    span class="text-xs text-green-700" { "On your watchlist" }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_page_escapes_message() {
        let html = error_page("<script>bad</script>");
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>bad"));
    }

    #[test]
    fn index_lists_every_mode() {
        let html = index_page();
        for mode in PairMode::ALL {
            assert!(html.contains(mode.slug()), "{}", mode.slug());
        }
    }
}
