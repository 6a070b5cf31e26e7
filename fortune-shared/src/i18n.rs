//! Advisory localized messages attached to progress events (spec §6:
//! "the server's `message` field is advisory and may already be
//! localized"). Clients are expected to translate the numeric status code
//! themselves; this table only saves a round-trip for the common case.

use crate::status::StatusCode;
use crate::task::Language;

/// Look up the advisory message for a status code in the requested
/// language. Falls back to English for any code this table does not cover.
pub fn message_for(status: StatusCode, language: Language) -> &'static str {
    let table = match language {
        Language::Zh => &ZH,
        Language::En => &EN,
        Language::Ja => &JA,
    };
    table
        .iter()
        .find(|(code, _)| *code == status)
        .map(|(_, msg)| *msg)
        .unwrap_or_else(|| {
            EN.iter()
                .find(|(code, _)| *code == status)
                .map(|(_, msg)| *msg)
                .unwrap_or("")
        })
}

type Table = [(StatusCode, &'static str); 36];

static ZH: Table = [
    (StatusCode::Queued, "已加入佇列"),
    (StatusCode::Initializing, "初始化任務..."),
    (StatusCode::Processing, "啟動處理流程..."),
    (StatusCode::RagStart, "開始檢索籤詩資料..."),
    (StatusCode::RagConnecting, "連接向量資料庫..."),
    (StatusCode::RagVectorizing, "生成查詢向量..."),
    (StatusCode::RagSearching, "搜索相似內容..."),
    (StatusCode::RagScoring, "計算相似度分數..."),
    (StatusCode::RagSorting, "排序搜索結果..."),
    (StatusCode::RagPreparing, "準備上下文資料..."),
    (StatusCode::RagComplete, "籤詩資料檢索完成"),
    (StatusCode::LlmStart, "開始分析籤詩..."),
    (StatusCode::LlmLoading, "載入模型..."),
    (StatusCode::LlmAnalyzing, "分析籤詩內容..."),
    (StatusCode::LlmContext, "建立上下文關聯..."),
    (StatusCode::LlmGenerating, "生成初步回應..."),
    (StatusCode::LlmOptimizing, "優化表達方式..."),
    (StatusCode::LlmWisdom, "結合傳統智慧..."),
    (StatusCode::LlmChecking, "檢查邏輯一致性..."),
    (StatusCode::LlmPolishing, "潤飾最終回應..."),
    (StatusCode::LlmFormatting, "格式化輸出..."),
    (StatusCode::LlmFinalCheck, "最終品質檢查..."),
    (StatusCode::LlmComplete, "分析完成"),
    (StatusCode::LlmStreaming, "正在生成..."),
    (StatusCode::LlmStreamingEarly, "生成中...（剛開始）"),
    (StatusCode::LlmStreamingMiddle, "生成中...（進展順利）"),
    (StatusCode::LlmStreamingLate, "生成中...（即將完成）"),
    (StatusCode::LlmStreamingOvertime, "生成中...（比預期稍長）"),
    (StatusCode::Validating, "驗證報告完整性..."),
    (StatusCode::ValidationComplete, "驗證通過"),
    (StatusCode::Finalizing, "完成最終處理..."),
    (StatusCode::Completed, "解籤完成！"),
    (StatusCode::Success, "成功生成您的解籤報告"),
    (StatusCode::Error, "處理發生錯誤"),
    (StatusCode::Timeout, "處理逾時"),
    (StatusCode::Failed, "處理失敗"),
];

static EN: Table = [
    (StatusCode::Queued, "Queued"),
    (StatusCode::Initializing, "Initializing task..."),
    (StatusCode::Processing, "Starting processing..."),
    (StatusCode::RagStart, "Retrieving poem data..."),
    (StatusCode::RagConnecting, "Connecting to vector database..."),
    (StatusCode::RagVectorizing, "Generating query vectors..."),
    (StatusCode::RagSearching, "Searching similar content..."),
    (StatusCode::RagScoring, "Calculating similarity scores..."),
    (StatusCode::RagSorting, "Sorting search results..."),
    (StatusCode::RagPreparing, "Preparing context data..."),
    (StatusCode::RagComplete, "Poem data retrieval complete"),
    (StatusCode::LlmStart, "Starting analysis..."),
    (StatusCode::LlmLoading, "Loading model..."),
    (StatusCode::LlmAnalyzing, "Analyzing poem content..."),
    (StatusCode::LlmContext, "Building context connections..."),
    (StatusCode::LlmGenerating, "Generating initial response..."),
    (StatusCode::LlmOptimizing, "Optimizing phrasing..."),
    (StatusCode::LlmWisdom, "Drawing on traditional wisdom..."),
    (StatusCode::LlmChecking, "Checking logical consistency..."),
    (StatusCode::LlmPolishing, "Polishing final response..."),
    (StatusCode::LlmFormatting, "Formatting output..."),
    (StatusCode::LlmFinalCheck, "Final quality check..."),
    (StatusCode::LlmComplete, "Analysis complete"),
    (StatusCode::LlmStreaming, "Generating..."),
    (StatusCode::LlmStreamingEarly, "In progress... (just started)"),
    (StatusCode::LlmStreamingMiddle, "In progress... (going well)"),
    (StatusCode::LlmStreamingLate, "In progress... (almost done)"),
    (StatusCode::LlmStreamingOvertime, "In progress... (taking a bit longer)"),
    (StatusCode::Validating, "Validating report completeness..."),
    (StatusCode::ValidationComplete, "Validation passed"),
    (StatusCode::Finalizing, "Finishing up..."),
    (StatusCode::Completed, "Interpretation complete!"),
    (StatusCode::Success, "Your interpretation report was generated successfully"),
    (StatusCode::Error, "An error occurred"),
    (StatusCode::Timeout, "Processing timed out"),
    (StatusCode::Failed, "Processing failed"),
];

static JA: Table = [
    (StatusCode::Queued, "キューに追加されました"),
    (StatusCode::Initializing, "タスクを初期化中..."),
    (StatusCode::Processing, "処理を開始しています..."),
    (StatusCode::RagStart, "おみくじデータを検索中..."),
    (StatusCode::RagConnecting, "ベクトルデータベースに接続中..."),
    (StatusCode::RagVectorizing, "クエリベクトルを生成中..."),
    (StatusCode::RagSearching, "類似コンテンツを検索中..."),
    (StatusCode::RagScoring, "類似度スコアを計算中..."),
    (StatusCode::RagSorting, "検索結果をソート中..."),
    (StatusCode::RagPreparing, "コンテキストデータを準備中..."),
    (StatusCode::RagComplete, "おみくじデータの検索完了"),
    (StatusCode::LlmStart, "分析を開始中..."),
    (StatusCode::LlmLoading, "モデルを読み込み中..."),
    (StatusCode::LlmAnalyzing, "おみくじ内容を分析中..."),
    (StatusCode::LlmContext, "コンテキスト関連を構築中..."),
    (StatusCode::LlmGenerating, "初期応答を生成中..."),
    (StatusCode::LlmOptimizing, "表現を最適化中..."),
    (StatusCode::LlmWisdom, "伝統的な知恵を組み込み中..."),
    (StatusCode::LlmChecking, "論理的整合性をチェック中..."),
    (StatusCode::LlmPolishing, "最終応答を磨き上げ中..."),
    (StatusCode::LlmFormatting, "出力をフォーマット中..."),
    (StatusCode::LlmFinalCheck, "最終品質チェック中..."),
    (StatusCode::LlmComplete, "分析完了"),
    (StatusCode::LlmStreaming, "生成中..."),
    (StatusCode::LlmStreamingEarly, "進行中...（開始したばかり）"),
    (StatusCode::LlmStreamingMiddle, "進行中...（順調）"),
    (StatusCode::LlmStreamingLate, "進行中...（もうすぐ完了）"),
    (StatusCode::LlmStreamingOvertime, "進行中...（予定より少し長め）"),
    (StatusCode::Validating, "レポートの整合性を検証中..."),
    (StatusCode::ValidationComplete, "検証完了"),
    (StatusCode::Finalizing, "最終処理を完了中..."),
    (StatusCode::Completed, "解釈完了！"),
    (StatusCode::Success, "解釈レポートの生成に成功しました"),
    (StatusCode::Error, "エラーが発生しました"),
    (StatusCode::Timeout, "処理がタイムアウトしました"),
    (StatusCode::Failed, "処理に失敗しました"),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_language_covers_every_status_code() {
        for status in [
            StatusCode::Queued,
            StatusCode::LlmStreamingOvertime,
            StatusCode::Completed,
            StatusCode::Failed,
        ] {
            assert!(!message_for(status, Language::Zh).is_empty());
            assert!(!message_for(status, Language::En).is_empty());
            assert!(!message_for(status, Language::Ja).is_empty());
        }
    }

    #[test]
    fn defaults_to_zh_for_unspecified_language() {
        assert_eq!(Language::default(), Language::Zh);
        assert_eq!(
            message_for(StatusCode::Completed, Language::default()),
            "解籤完成！"
        );
    }
}
