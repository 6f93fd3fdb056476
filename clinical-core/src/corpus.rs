//! # Notas Clínicas de Demonstração
//!
//! Notas sintéticas (sem dados de pacientes reais) que cobrem os formatos que
//! o segmentador precisa tratar:
//!
//! - cabeçalhos chineses com dois-pontos de largura total;
//! - cabeçalhos ingleses e sinônimos (`Impression`, `CC`, `HPI`);
//! - diagnósticos com `#` e `s/p`;
//! - listas numeradas quebradas pelo corte de sentenças;
//! - decimais ("38.5") que não podem encerrar sentença;
//! - nota sem nenhum cabeçalho (fallback "全文").

/// Textos de demonstração para a interface web: `(título, texto)`.
pub fn demo_texts() -> Vec<(&'static str, &'static str)> {
    vec![
        (
            "Chinês",
            "診斷：\n# 冠狀動脈疾病 s/p 心導管\n# 高血壓\n# 第二型糖尿病\n主訴：\n胸痛三天，伴隨喘 and 冒冷汗。體溫38.5度。\n過去病史：\n高血壓 十年，規則服用 amlodipine。糖尿病 五年。\n住院治療經過：\n入院後 安排心導管 檢查。給予 aspirin 及 clopidogrel 治療，病情穩定。\n",
        ),
        (
            "Inglês",
            "Impression: Community acquired pneumonia - s/p ceftriaxone\nCC: fever, productive cough (yellow sputum, 3 days) and dyspnea\nHPI: 1. Hypertension for 10 years. 2. Type 2 diabetes mellitus on metformin.\nHospital Course:\nTemperature 38.5 C on admission. Ceftriaxone was given and fever subsided.\nDischarged in stable condition.\n",
        ),
        (
            "Misto",
            "主訴：Chest pain for 2 hours.\nDiagnosis:\n# Acute coronary syndrome ## CAD\n- s/p PCI\n住院經過：\n(1) Emergent PCI was performed. (2) Aspirin 100 mg and clopidogrel 75 mg were prescribed.\n",
        ),
        (
            "Sem cabeçalhos",
            "Patient was admitted for fever and cough.\nChest X-ray showed right lower lobe pneumonia.\n\nAntibiotics were started; symptoms improved.\n",
        ),
        (
            "Com preâmbulo",
            "Admission note 2024/03/05\nWard 7B\nDiagnosis: Sepsis, CKD stage 3\nChief Complaint: fever and chills\nPast History:\nCKD on hemodialysis. HTN.\n",
        ),
    ]
}
